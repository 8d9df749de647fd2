// Audio decoding, MFCC computation, and genre-tree extraction for genre-rnn.

pub mod decode;
pub mod error;
pub mod extract;
pub mod fft;
pub mod mel;
pub mod mfcc;
pub mod segment;

pub use error::AudioError;
pub use extract::{Extraction, ExtractionReport, FileReport, GenreExtractor, save_mfcc};
pub use mfcc::MfccExtractor;
pub use segment::SegmentPlan;
