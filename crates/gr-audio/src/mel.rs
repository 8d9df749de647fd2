//! Slaney mel filterbank, built by `mel_spec` and stored flat for the MFCC loop.

/// Banc de filtres triangulaires mel, normalisés en aire (Slaney).
///
/// Stored row-major as `n_mels` rows of `n_fft / 2 + 1` weights.
///
/// # Example
/// ```
/// use gr_audio::mel::MelFilterbank;
/// let fb = MelFilterbank::new(22050, 2048, 128);
/// assert_eq!(fb.n_mels(), 128);
/// assert_eq!(fb.n_bins(), 1025);
/// ```
#[derive(Clone, Debug)]
pub struct MelFilterbank {
    weights: Vec<f32>,
    n_mels: usize,
    n_bins: usize,
}

impl MelFilterbank {
    /// Build `n_mels` filters spanning 0 Hz to Nyquist for an `n_fft` spectrum.
    #[must_use]
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        // Slaney scale (htk = false), area normalisation (norm = true).
        let filters = mel_spec::mel::mel(
            f64::from(sample_rate),
            n_fft,
            n_mels,
            None,
            None,
            false,
            true,
        );
        let (rows, n_bins) = filters.dim();
        debug_assert_eq!(rows, n_mels, "mel_spec filter count");
        let weights = filters.iter().map(|&w| w as f32).collect();

        Self {
            weights,
            n_mels: rows,
            n_bins,
        }
    }

    /// Project a power spectrum onto the mel bands.
    ///
    /// `out` must hold `n_mels` values; bins beyond `power.len()` count as zero.
    pub fn apply(&self, power: &[f32], out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.n_mels, "mel output size");
        let bins = power.len().min(self.n_bins);
        for (m, slot) in out.iter_mut().enumerate() {
            let row = &self.weights[m * self.n_bins..m * self.n_bins + bins];
            *slot = row.iter().zip(&power[..bins]).map(|(w, p)| w * p).sum();
        }
    }

    /// Weights of filter `m`.
    #[must_use]
    pub fn filter(&self, m: usize) -> &[f32] {
        &self.weights[m * self.n_bins..(m + 1) * self.n_bins]
    }

    #[must_use]
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }
}
