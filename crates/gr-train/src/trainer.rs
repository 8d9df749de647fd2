use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use gr_core::{Dataset, TrainConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::data::{Samples, prepare_splits};
use crate::error::TrainError;
use crate::model::{GenreRnn, ModelSpec};
use crate::predict::{DemoPrediction, demo_prediction, genre_label};

/// Courbes d'entraînement, une valeur par époque.
pub const HISTORY_FILE: &str = "history.json";

/// Output layer size for `dataset`.
///
/// The size is the mapping length. A configured count that disagrees with
/// it, or a label the output layer could not produce, refuses training.
///
/// # Errors
/// Returns `TrainError::EmptyDataset`, `ClassCountMismatch` or
/// `LabelOutOfRange`.
pub fn resolve_num_classes(
    dataset: &Dataset,
    configured: Option<usize>,
) -> Result<usize, TrainError> {
    if dataset.is_empty() {
        return Err(TrainError::EmptyDataset);
    }
    let mapping = dataset.num_classes();
    if let Some(configured) = configured
        && configured != mapping
    {
        return Err(TrainError::ClassCountMismatch {
            configured,
            mapping,
        });
    }
    if let Some(&label) = dataset.labels.iter().find(|&&l| l as usize >= mapping) {
        return Err(TrainError::LabelOutOfRange {
            label,
            classes: mapping,
        });
    }
    Ok(mapping)
}

/// Loss and accuracy of a model over a sample set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// Per-epoch metrics, in the layout of a Keras `History`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f32>,
    pub accuracy: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_accuracy: Vec<f32>,
}

impl History {
    #[must_use]
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    fn record(&mut self, train: Evaluation, validation: Evaluation) {
        self.loss.push(train.loss);
        self.accuracy.push(train.accuracy);
        self.val_loss.push(validation.loss);
        self.val_accuracy.push(validation.accuracy);
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Impossible d'écrire {}", path.display()))
    }

    /// # Errors
    /// Returns an error if the file is missing or malformed.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {}", path.display()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Running sums over the batches of one pass.
#[derive(Default)]
struct Accumulator {
    loss: f64,
    correct: f64,
    seen: usize,
}

impl Accumulator {
    fn add(&mut self, logits: &Tensor, targets: &Tensor, loss: &Tensor) -> candle_core::Result<()> {
        let n = targets.dim(0)?;
        self.loss += f64::from(loss.to_scalar::<f32>()?) * n as f64;
        self.correct += f64::from(
            logits
                .argmax(D::Minus1)?
                .eq(targets)?
                .to_dtype(DType::F32)?
                .sum_all()?
                .to_scalar::<f32>()?,
        );
        self.seen += n;
        Ok(())
    }

    fn finish(&self) -> Evaluation {
        let n = self.seen.max(1) as f64;
        Evaluation {
            loss: (self.loss / n) as f32,
            accuracy: (self.correct / n) as f32,
        }
    }
}

/// Boucle d'entraînement. Owns the run's seeded rng.
pub struct Trainer {
    config: TrainConfig,
    device: Device,
    rng: StdRng,
    seed: u64,
}

impl Trainer {
    /// Validate `config` and seed the run.
    ///
    /// Without a configured seed one is drawn from entropy and logged.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if a hyperparameter is invalid.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        log::info!("Graine aléatoire : {seed}");
        Ok(Self {
            config,
            device: Device::Cpu,
            rng: StdRng::seed_from_u64(seed),
            seed,
        })
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Architecture for inputs shaped like `samples`.
    #[must_use]
    pub fn model_spec(&self, samples: &Samples, num_classes: usize) -> ModelSpec {
        let (input_frames, input_coeffs) = samples.shape();
        ModelSpec {
            input_frames,
            input_coeffs,
            lstm_units: self.config.lstm_units,
            dense_units: self.config.dense_units,
            dropout: self.config.dropout,
            num_classes,
        }
    }

    /// Build the network and draw its weights from the run's rng.
    ///
    /// # Errors
    /// Returns an error if a parameter tensor cannot be allocated.
    pub fn build_model(&mut self, spec: ModelSpec) -> candle_core::Result<GenreRnn> {
        let model = GenreRnn::new(spec, &self.device)?;
        model.init_weights(&mut self.rng)?;
        Ok(model)
    }

    /// Train for `config.epochs` epochs, evaluating on `validation` after each.
    ///
    /// # Errors
    /// Returns `TrainError::ShapeMismatch` if the samples do not fit the
    /// model, or any tensor error raised during training.
    pub fn fit(
        &mut self,
        model: &GenreRnn,
        train: &Samples,
        validation: &Samples,
    ) -> Result<History> {
        check_shape(model, train)?;
        check_shape(model, validation)?;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            weight_decay: 0.0,
        };
        let mut optimizer = AdamW::new(model.vars(), params)?;
        let mut history = History::default();
        let mut order: Vec<usize> = (0..train.len()).collect();
        let epochs = self.config.epochs;

        for epoch in 1..=epochs {
            order.shuffle(&mut self.rng);
            let mut acc = Accumulator::default();
            for batch in order.chunks(self.config.batch_size) {
                let (xs, ys) = train.batch(batch, &self.device)?;
                let logits = model.forward_train(&xs, &mut self.rng)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &ys)?;
                optimizer.backward_step(&loss)?;
                acc.add(&logits, &ys, &loss)?;
            }
            let train_eval = acc.finish();
            let val_eval = self.evaluate(model, validation)?;
            log::info!(
                "Epoch {epoch}/{epochs} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
                train_eval.loss,
                train_eval.accuracy,
                val_eval.loss,
                val_eval.accuracy
            );
            history.record(train_eval, val_eval);
        }
        Ok(history)
    }

    /// Loss and accuracy on `samples`, without dropout.
    ///
    /// # Errors
    /// Returns `TrainError::ShapeMismatch` or a tensor error.
    pub fn evaluate(&self, model: &GenreRnn, samples: &Samples) -> Result<Evaluation> {
        check_shape(model, samples)?;
        let indices: Vec<usize> = (0..samples.len()).collect();
        let mut acc = Accumulator::default();
        for batch in indices.chunks(self.config.batch_size) {
            let (xs, ys) = samples.batch(batch, &self.device)?;
            let logits = model.forward(&xs)?;
            let loss = candle_nn::loss::cross_entropy(&logits, &ys)?;
            acc.add(&logits, &ys, &loss)?;
        }
        Ok(acc.finish())
    }
}

pub(crate) fn check_shape(model: &GenreRnn, samples: &Samples) -> Result<(), TrainError> {
    let spec = model.spec();
    let expected = (spec.input_frames, spec.input_coeffs);
    if samples.shape() == expected {
        Ok(())
    } else {
        Err(TrainError::ShapeMismatch {
            expected,
            found: samples.shape(),
        })
    }
}

/// Résultat d'une exécution complète.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub history: History,
    pub test: Evaluation,
    pub demo: Option<DemoPrediction>,
    pub seed: u64,
    pub model_dir: PathBuf,
}

/// Load the dataset, split, train, evaluate, save and run the demo prediction.
///
/// Nothing is written unless training gets past the class-count check.
///
/// # Errors
/// Returns an error if the dataset cannot be loaded, is inconsistent with
/// the configuration, or training fails.
pub fn run_training(config: &TrainConfig) -> Result<TrainingOutcome> {
    let dataset = Dataset::load_json(&config.data_path)
        .with_context(|| format!("Chargement de {}", config.data_path.display()))?;
    let num_classes = resolve_num_classes(&dataset, config.num_classes)?;
    let samples = Samples::from_dataset(&dataset)?;
    log::info!(
        "{} segments, {} genres, forme {:?}",
        samples.len(),
        num_classes,
        samples.shape()
    );

    let mut trainer = Trainer::new(config.clone())?;
    let splits = prepare_splits(
        &samples,
        config.test_size,
        config.validation_size,
        trainer.rng_mut(),
    )?;

    let spec = trainer.model_spec(&samples, num_classes);
    let model = trainer.build_model(spec)?;
    log::info!("\n{}", model.summary());

    let history = trainer.fit(&model, &splits.train, &splits.validation)?;
    let test = trainer.evaluate(&model, &splits.test)?;
    log::info!("Test accuracy: {:.4}", test.accuracy);

    model.save(&config.model_dir, &dataset.mapping)?;
    history.save_json(&config.model_dir.join(HISTORY_FILE))?;

    let demo = demo_prediction(&model, &splits.test, config.demo_index)?;
    if let Some(demo) = &demo {
        log::info!(
            "Target: {}, Predicted label: {}",
            genre_label(&dataset.mapping, demo.expected as usize),
            demo.prediction.display_label(&dataset.mapping)
        );
    }

    Ok(TrainingOutcome {
        history,
        test,
        demo,
        seed: trainer.seed(),
        model_dir: config.model_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Two classes: constant negative vs constant positive sequences.
    fn separable(n: usize, seed: u64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ds = Dataset::new(vec!["blues".into(), "jazz".into()]);
        for i in 0..n {
            let label = (i % 2) as u32;
            let sign = if label == 0 { -1.0 } else { 1.0 };
            let matrix = (0..4)
                .map(|_| (0..3).map(|_| sign + rng.gen_range(-0.1..0.1)).collect())
                .collect();
            ds.push(matrix, label);
        }
        ds
    }

    fn small_config(dir: &Path) -> TrainConfig {
        TrainConfig {
            data_path: dir.join("data.json"),
            model_dir: dir.join("model"),
            learning_rate: 1e-2,
            batch_size: 8,
            epochs: 2,
            lstm_units: 8,
            dense_units: 8,
            dropout: 0.2,
            seed: Some(7),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn num_classes_follows_mapping() {
        let ds = separable(4, 0);
        assert_eq!(resolve_num_classes(&ds, None), Ok(2));
        assert_eq!(resolve_num_classes(&ds, Some(2)), Ok(2));
    }

    #[test]
    fn hard_coded_ten_classes_on_two_genres_is_refused() {
        let ds = separable(4, 0);
        assert_eq!(
            resolve_num_classes(&ds, Some(10)),
            Err(TrainError::ClassCountMismatch {
                configured: 10,
                mapping: 2
            })
        );
    }

    #[test]
    fn stray_label_is_refused() {
        let mut ds = separable(4, 0);
        ds.labels[1] = 5;
        assert!(matches!(
            resolve_num_classes(&ds, None),
            Err(TrainError::LabelOutOfRange { label: 5, .. })
        ));
    }

    #[test]
    fn empty_dataset_is_refused() {
        let ds = Dataset::new(vec!["blues".into()]);
        assert_eq!(resolve_num_classes(&ds, None), Err(TrainError::EmptyDataset));
    }

    #[test]
    fn fit_reduces_loss_on_separable_data() {
        let samples = Samples::from_dataset(&separable(48, 1)).unwrap();
        let config = TrainConfig {
            learning_rate: 1e-2,
            batch_size: 8,
            epochs: 15,
            lstm_units: 8,
            dense_units: 8,
            dropout: 0.0,
            seed: Some(3),
            ..TrainConfig::default()
        };
        let mut trainer = Trainer::new(config).unwrap();
        let model = trainer.build_model(trainer.model_spec(&samples, 2)).unwrap();
        let validation = samples.subset(&[0, 1, 2, 3]);
        let history = trainer.fit(&model, &samples, &validation).unwrap();

        assert_eq!(history.epochs(), 15);
        assert_eq!(history.val_accuracy.len(), 15);
        let first = history.loss[0];
        let last = history.loss[14];
        assert!(last < first, "loss {first} -> {last}");
        assert!(history.accuracy.iter().all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn evaluate_rejects_wrong_shape() {
        let samples = Samples::from_dataset(&separable(8, 1)).unwrap();
        let mut trainer = Trainer::new(TrainConfig {
            seed: Some(1),
            ..TrainConfig::default()
        })
        .unwrap();
        let mut spec = trainer.model_spec(&samples, 2);
        spec.input_frames = 9;
        let model = trainer.build_model(spec).unwrap();
        let err = trainer.evaluate(&model, &samples).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn run_training_writes_model_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        separable(40, 2).save_json(&config.data_path).unwrap();

        let outcome = run_training(&config).unwrap();
        assert_eq!(outcome.seed, 7);
        assert_eq!(outcome.history.epochs(), 2);
        assert!(config.model_dir.join(crate::model::WEIGHTS_FILE).exists());
        assert!(config.model_dir.join(crate::model::META_FILE).exists());
        let saved = History::load_json(&config.model_dir.join(HISTORY_FILE)).unwrap();
        assert_eq!(saved, outcome.history);

        // demo_index 500 is past the 10-sample test set.
        let demo = outcome.demo.unwrap();
        assert_eq!(demo.index, 9);
        assert!(demo.expected < 2);
    }

    #[test]
    fn class_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            num_classes: Some(10),
            ..small_config(dir.path())
        };
        separable(40, 2).save_json(&config.data_path).unwrap();

        let err = run_training(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::ClassCountMismatch { .. })
        ));
        assert!(!config.model_dir.exists());
    }
}
