use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// What to do when an audio file cannot be decoded.
///
/// # Example
/// ```
/// use gr_core::config::DecodeErrorPolicy;
/// assert_eq!(DecodeErrorPolicy::default(), DecodeErrorPolicy::Abort);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// Stop the whole run on the first undecodable file.
    #[default]
    Abort,
    /// Record the file as skipped in the report and carry on.
    Skip,
}

/// Paramètres de l'extraction MFCC.
///
/// # Example
/// ```
/// use gr_core::ExtractConfig;
/// let config = ExtractConfig::default();
/// assert_eq!(config.samples_per_track(), 661_500);
/// assert_eq!(config.num_segments, 10);
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExtractConfig {
    /// Root directory; each immediate subdirectory is one genre.
    pub dataset_path: PathBuf,
    /// Output JSON file.
    pub json_path: PathBuf,
    /// Every clip is resampled to this rate before analysis.
    pub sample_rate: u32,
    /// Length of audio considered per clip, in seconds.
    pub track_duration_secs: f32,
    /// Number of segments each clip is cut into.
    pub num_segments: usize,
    /// Coefficients kept per frame.
    pub n_mfcc: usize,
    /// FFT window size.
    pub n_fft: usize,
    /// Hop between consecutive frames, in samples.
    pub hop_length: usize,
    /// Number of mel bands before the DCT.
    pub n_mels: usize,
    /// Decode failure handling.
    pub on_decode_error: DecodeErrorPolicy,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("Data"),
            json_path: PathBuf::from("data.json"),
            sample_rate: 22050,
            track_duration_secs: 30.0,
            num_segments: 10,
            n_mfcc: 13,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            on_decode_error: DecodeErrorPolicy::Abort,
        }
    }
}

impl ExtractConfig {
    /// Total samples analysed per clip.
    #[must_use]
    pub fn samples_per_track(&self) -> usize {
        (self.sample_rate as f32 * self.track_duration_secs) as usize
    }

    /// Reject parameter combinations the extractor cannot work with.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sample_rate == 0 {
            return Err(CoreError::Config("extract.sample_rate doit être > 0".into()));
        }
        if self.track_duration_secs.is_nan() || self.track_duration_secs <= 0.0 {
            return Err(CoreError::Config(
                "extract.track_duration_secs doit être > 0".into(),
            ));
        }
        if self.num_segments == 0 {
            return Err(CoreError::Config("extract.num_segments doit être > 0".into()));
        }
        if self.n_fft == 0 || self.hop_length == 0 {
            return Err(CoreError::Config(
                "extract.n_fft et extract.hop_length doivent être > 0".into(),
            ));
        }
        if self.n_mfcc == 0 || self.n_mfcc > self.n_mels {
            return Err(CoreError::Config(format!(
                "extract.n_mfcc ({}) doit être dans [1, n_mels = {}]",
                self.n_mfcc, self.n_mels
            )));
        }
        if self.samples_per_track() < self.num_segments {
            return Err(CoreError::Config(
                "extract.num_segments dépasse le nombre d'échantillons par piste".into(),
            ));
        }
        Ok(())
    }
}

/// Paramètres de l'entraînement.
///
/// # Example
/// ```
/// use gr_core::TrainConfig;
/// let config = TrainConfig::default();
/// assert_eq!(config.epochs, 30);
/// assert_eq!(config.batch_size, 32);
/// assert!(config.seed.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TrainConfig {
    /// Dataset JSON produced by the extractor.
    pub data_path: PathBuf,
    /// Directory receiving the weights, model metadata and history.
    pub model_dir: PathBuf,
    /// Fraction of the dataset held out for the final test.
    pub test_size: f64,
    /// Fraction of the remaining training set held out for validation.
    pub validation_size: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Hidden size of both LSTM layers.
    pub lstm_units: usize,
    /// Width of the dense hidden layer.
    pub dense_units: usize,
    /// Dropout rate after the dense layer.
    pub dropout: f32,
    /// Expected genre count. `None` derives it from the dataset mapping.
    pub num_classes: Option<usize>,
    /// Seed for splits, batch order, init and dropout. `None` draws one.
    pub seed: Option<u64>,
    /// Test sample used for the demonstration prediction.
    pub demo_index: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data.json"),
            model_dir: PathBuf::from("model"),
            test_size: 0.25,
            validation_size: 0.2,
            learning_rate: 1e-4,
            batch_size: 32,
            epochs: 30,
            lstm_units: 64,
            dense_units: 64,
            dropout: 0.3,
            num_classes: None,
            seed: None,
            demo_index: 500,
        }
    }
}

impl TrainConfig {
    /// Reject hyperparameters the trainer cannot work with.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, value) in [
            ("train.test_size", self.test_size),
            ("train.validation_size", self.validation_size),
        ] {
            if value.is_nan() || value <= 0.0 || value >= 1.0 {
                return Err(CoreError::Config(format!(
                    "{name} ({value}) doit être dans ]0, 1["
                )));
            }
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(CoreError::Config("train.learning_rate doit être > 0".into()));
        }
        if self.batch_size == 0 || self.epochs == 0 {
            return Err(CoreError::Config(
                "train.batch_size et train.epochs doivent être > 0".into(),
            ));
        }
        if self.lstm_units == 0 || self.dense_units == 0 {
            return Err(CoreError::Config(
                "train.lstm_units et train.dense_units doivent être > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CoreError::Config(format!(
                "train.dropout ({}) doit être dans [0, 1[",
                self.dropout
            )));
        }
        if self.num_classes == Some(0) {
            return Err(CoreError::Config("train.num_classes doit être > 0".into()));
        }
        Ok(())
    }
}

/// Configuration complète des deux étapes.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub extract: ExtractConfig,
    pub train: TrainConfig,
}

impl Config {
    /// Validate both sections.
    ///
    /// # Errors
    /// Returns the first invalid field of either section.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.extract.validate()?;
        self.train.validate()
    }
}

/// Structure TOML intermédiaire pour désérialisation avec valeurs optionnelles.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    extract: Option<ExtractSection>,
    train: Option<TrainSection>,
}

/// Extract section of the TOML config, all fields optional for partial override.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractSection {
    dataset_path: Option<PathBuf>,
    json_path: Option<PathBuf>,
    sample_rate: Option<u32>,
    track_duration_secs: Option<f32>,
    num_segments: Option<usize>,
    n_mfcc: Option<usize>,
    n_fft: Option<usize>,
    hop_length: Option<usize>,
    n_mels: Option<usize>,
    on_decode_error: Option<DecodeErrorPolicy>,
}

/// Train section of the TOML config, all fields optional.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TrainSection {
    data_path: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    test_size: Option<f64>,
    validation_size: Option<f64>,
    learning_rate: Option<f64>,
    batch_size: Option<usize>,
    epochs: Option<usize>,
    lstm_units: Option<usize>,
    dense_units: Option<usize>,
    dropout: Option<f32>,
    num_classes: Option<usize>,
    seed: Option<u64>,
    demo_index: Option<usize>,
}

/// Overwrite `$target.$field` with every `Some` field of `$section`.
macro_rules! merge_fields {
    ($section:expr, $target:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(v) = $section.$field {
                $target.$field = v;
            }
        )*
    };
}

/// Parse TOML text and merge it over the defaults.
///
/// # Errors
/// Returns an error if the text is not valid TOML for this schema, or if the
/// merged values fail validation.
///
/// # Example
/// ```
/// use gr_core::config::parse_config;
/// let config = parse_config("[train]\nepochs = 5\nseed = 7\n").unwrap();
/// assert_eq!(config.train.epochs, 5);
/// assert_eq!(config.train.seed, Some(7));
/// assert_eq!(config.extract.n_mfcc, 13);
/// ```
pub fn parse_config(content: &str) -> Result<Config> {
    let file: ConfigFile = toml::from_str(content).context("Erreur de parsing TOML")?;
    let mut config = Config::default();

    if let Some(e) = file.extract {
        merge_fields!(
            e,
            config.extract,
            [
                dataset_path,
                json_path,
                sample_rate,
                track_duration_secs,
                num_segments,
                n_mfcc,
                n_fft,
                hop_length,
                n_mels,
                on_decode_error,
            ]
        );
    }

    if let Some(t) = file.train {
        merge_fields!(
            t,
            config.train,
            [
                data_path,
                model_dir,
                test_size,
                validation_size,
                learning_rate,
                batch_size,
                epochs,
                lstm_units,
                dense_units,
                dropout,
                demo_index,
            ]
        );
        if t.num_classes.is_some() {
            config.train.num_classes = t.num_classes;
        }
        if t.seed.is_some() {
            config.train.seed = t.seed;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// # Errors
/// Returns an error if the file cannot be read, parsed, or validated.
///
/// # Example
/// ```no_run
/// use gr_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(CoreError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Configuration invalide dans {}", path.display()))
}
