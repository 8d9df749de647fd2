use std::ops::Range;

use gr_core::ExtractConfig;

/// Découpage d'une piste en segments de taille fixe.
///
/// # Example
/// ```
/// use gr_audio::SegmentPlan;
/// let plan = SegmentPlan::new(661_500, 10, 512);
/// assert_eq!(plan.samples_per_segment, 66_150);
/// assert_eq!(plan.expected_frames, 130);
/// assert_eq!(plan.bounds(1, 661_500), 66_150..132_300);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Samples analysed per clip; anything past this is ignored.
    pub samples_per_track: usize,
    pub num_segments: usize,
    pub samples_per_segment: usize,
    /// MFCC frames a complete segment produces.
    pub expected_frames: usize,
}

impl SegmentPlan {
    #[must_use]
    pub fn new(samples_per_track: usize, num_segments: usize, hop_length: usize) -> Self {
        let samples_per_segment = samples_per_track / num_segments.max(1);
        Self {
            samples_per_track,
            num_segments,
            samples_per_segment,
            expected_frames: samples_per_segment.div_ceil(hop_length.max(1)),
        }
    }

    #[must_use]
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(
            config.samples_per_track(),
            config.num_segments,
            config.hop_length,
        )
    }

    /// Sample range of segment `index` in a signal of `signal_len` samples.
    ///
    /// The range is clipped to the signal, so trailing segments of a short
    /// clip come back shorter or empty.
    #[must_use]
    pub fn bounds(&self, index: usize, signal_len: usize) -> Range<usize> {
        let start = index * self.samples_per_segment;
        let end = start + self.samples_per_segment;
        start.min(signal_len)..end.min(signal_len)
    }
}
