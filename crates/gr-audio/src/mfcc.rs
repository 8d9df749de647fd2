use std::sync::Arc;

use rustdct::{DctPlanner, TransformType2And3};

use crate::fft::FftPipeline;
use crate::mel::MelFilterbank;

/// Floor applied to mel energies before taking the log.
const AMIN: f32 = 1e-10;
/// Dynamic range kept below the loudest mel energy of a segment.
const TOP_DB: f32 = 80.0;

/// Number of frames a centred STFT yields for `len` samples.
///
/// The signal is padded by `n_fft / 2` on both sides, so for an even
/// `n_fft` this is `1 + len / hop_length`.
///
/// # Example
/// ```
/// use gr_audio::mfcc::frame_count;
/// assert_eq!(frame_count(66_150, 2048, 512), 130);
/// assert_eq!(frame_count(1024, 1023, 256), 4);
/// assert_eq!(frame_count(0, 2048, 512), 0);
/// ```
#[must_use]
pub fn frame_count(len: usize, n_fft: usize, hop_length: usize) -> usize {
    if len == 0 || hop_length == 0 {
        return 0;
    }
    let padded = len + 2 * (n_fft / 2);
    if padded < n_fft {
        0
    } else {
        1 + (padded - n_fft) / hop_length
    }
}

/// Calcul des MFCC d'un segment audio.
///
/// Centred frames (zero-padded by `n_fft / 2` on both sides), periodic Hann
/// window, power spectrum, Slaney mel filterbank, dB scale clipped to 80 dB
/// below the segment maximum, orthonormal DCT-II.
///
/// # Example
/// ```
/// use gr_audio::MfccExtractor;
/// let mut mfcc = MfccExtractor::new(22050, 2048, 512, 128, 13);
/// let matrix = mfcc.compute(&vec![0.0f32; 22050]);
/// assert_eq!(matrix.len(), 44);
/// assert!(matrix.iter().all(|row| row.len() == 13));
/// ```
#[derive(Clone)]
pub struct MfccExtractor {
    fft: FftPipeline,
    filterbank: Arc<MelFilterbank>,
    dct: Arc<dyn TransformType2And3<f32>>,
    dct_buf: Vec<f32>,
    hop_length: usize,
    n_mfcc: usize,
    padded: Vec<f32>,
}

impl MfccExtractor {
    /// # Panics
    /// Panics if `n_fft` is 0.
    #[must_use]
    pub fn new(
        sample_rate: u32,
        n_fft: usize,
        hop_length: usize,
        n_mels: usize,
        n_mfcc: usize,
    ) -> Self {
        Self {
            fft: FftPipeline::new(n_fft),
            filterbank: Arc::new(MelFilterbank::new(sample_rate, n_fft, n_mels)),
            dct: DctPlanner::new().plan_dct2(n_mels),
            dct_buf: vec![0.0; n_mels],
            hop_length: hop_length.max(1),
            n_mfcc,
            padded: Vec::new(),
        }
    }

    /// Build an extractor from the extraction settings.
    #[must_use]
    pub fn from_config(config: &gr_core::ExtractConfig) -> Self {
        Self::new(
            config.sample_rate,
            config.n_fft,
            config.hop_length,
            config.n_mels,
            config.n_mfcc,
        )
    }

    /// Coefficients per frame.
    #[must_use]
    pub fn n_mfcc(&self) -> usize {
        self.n_mfcc
    }

    /// MFCC matrix of `samples`, frames × coefficients.
    ///
    /// An empty input yields an empty matrix.
    pub fn compute(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        if samples.is_empty() {
            return Vec::new();
        }

        let n_fft = self.fft.fft_size();
        let pad = n_fft / 2;
        self.padded.clear();
        self.padded.resize(pad, 0.0);
        self.padded.extend_from_slice(samples);
        self.padded.resize(self.padded.len() + pad, 0.0);

        let frames = frame_count(samples.len(), n_fft, self.hop_length);
        if frames == 0 {
            return Vec::new();
        }
        let n_mels = self.filterbank.n_mels();

        // Log-mel spectrogram, frames × n_mels.
        let mut log_mel = vec![0.0f32; frames * n_mels];
        let mut max_db = f32::NEG_INFINITY;
        for (t, row) in log_mel.chunks_exact_mut(n_mels).enumerate() {
            let start = t * self.hop_length;
            let power = self.fft.power_spectrum(&self.padded[start..start + n_fft]);
            self.filterbank.apply(power, row);
            for v in row.iter_mut() {
                *v = 10.0 * v.max(AMIN).log10();
                max_db = max_db.max(*v);
            }
        }

        // DCT-II non normalisée de rustdct, mise à l'échelle orthonormale.
        let floor = max_db - TOP_DB;
        let n = n_mels as f32;
        let (scale0, scale) = ((1.0 / n).sqrt(), (2.0 / n).sqrt());
        let mut out = Vec::with_capacity(frames);
        for row in log_mel.chunks_exact(n_mels) {
            for (slot, &v) in self.dct_buf.iter_mut().zip(row) {
                *slot = v.max(floor);
            }
            self.dct.process_dct2(&mut self.dct_buf);
            out.push(
                self.dct_buf[..self.n_mfcc]
                    .iter()
                    .enumerate()
                    .map(|(k, c)| c * if k == 0 { scale0 } else { scale })
                    .collect(),
            );
        }
        out
    }
}
