/// Configuration, dataset record, and error types shared by genre-rnn.
///
/// The extractor and the trainer only communicate through the [`Dataset`]
/// JSON file; both read their parameters from [`Config`].

pub mod config;
pub mod dataset;
pub mod error;

pub use config::{Config, DecodeErrorPolicy, ExtractConfig, TrainConfig};
pub use dataset::Dataset;
pub use error::{CoreError, DatasetError};
