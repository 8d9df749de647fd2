use std::sync::Arc;

use realfft::RealFftPlanner;
use realfft::num_complex::Complex;

/// FFT pipeline: windowed real FFT using realfft.
///
/// Pre-allocates the FFT plan and scratch buffers; one pipeline per worker
/// thread (`Clone` shares the plan, not the buffers).
///
/// # Example
/// ```
/// use gr_audio::fft::FftPipeline;
/// let fft = FftPipeline::new(2048);
/// assert_eq!(fft.num_bins(), 1025);
/// ```
#[derive(Clone)]
pub struct FftPipeline {
    fft_size: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    power_buf: Vec<f32>,
    plan: Arc<dyn realfft::RealToComplex<f32>>,
    /// Periodic Hann window coefficients.
    window: Vec<f32>,
}

impl FftPipeline {
    /// Create a new FFT pipeline with the given window size.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let power_buf = vec![0.0; spectrum_buf.len()];

        // Hann périodique (fftbins=True) : dénominateur N, pas N - 1.
        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos())
            .map(|w| w as f32)
            .collect();

        Self {
            fft_size: size,
            input_buf,
            spectrum_buf,
            scratch,
            power_buf,
            plan,
            window,
        }
    }

    /// Power spectrum `|X|^2` of one windowed frame (N/2+1 bins).
    ///
    /// Frames shorter than the FFT size are zero-padded.
    ///
    /// # Example
    /// ```
    /// use gr_audio::fft::FftPipeline;
    /// let mut fft = FftPipeline::new(256);
    /// let power = fft.power_spectrum(&[0.0f32; 256]);
    /// assert_eq!(power.len(), 129); // N/2 + 1
    /// assert!(power.iter().all(|&p| p == 0.0));
    /// ```
    pub fn power_spectrum(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.fft_size.min(samples.len());

        // Copy and window
        for (i, slot) in self.input_buf.iter_mut().enumerate() {
            *slot = if i < n {
                samples[i] * self.window[i]
            } else {
                0.0
            };
        }

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            self.power_buf.fill(0.0);
            return &self.power_buf;
        }

        for (p, c) in self.power_buf.iter_mut().zip(&self.spectrum_buf) {
            *p = c.re * c.re + c.im * c.im;
        }
        &self.power_buf
    }

    /// FFT window size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins produced per frame.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 1024;
        let sr = 22050.0f32;
        // Bin 40 exactly.
        let freq = 40.0 * sr / size as f32;
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect();

        let mut fft = FftPipeline::new(size);
        let power = fft.power_spectrum(&samples);
        let peak = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(40));
    }

    #[test]
    fn window_is_periodic() {
        let fft = FftPipeline::new(8);
        assert!(fft.window[0].abs() < 1e-7);
        // Periodic Hann reaches exactly 1.0 at N/2.
        assert!((fft.window[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn short_frame_is_zero_padded() {
        let mut fft = FftPipeline::new(64);
        let power = fft.power_spectrum(&[1.0; 10]);
        assert_eq!(power.len(), 33);
        assert!(power[0] > 0.0);
    }
}
