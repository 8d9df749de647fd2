// Recurrent genre classifier: splits, model, training loop, and prediction.

pub mod data;
pub mod error;
pub mod model;
pub mod predict;
pub mod report;
pub mod trainer;

pub use candle_core::Device;
pub use data::{Samples, Splits};
pub use error::TrainError;
pub use model::{GenreRnn, LayerInfo, ModelSpec};
pub use predict::{DemoPrediction, Prediction};
pub use trainer::{Evaluation, History, Trainer, TrainingOutcome, run_training};
