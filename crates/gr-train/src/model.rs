use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{LSTM, LSTMConfig, Linear, Module, RNN, VarBuilder, VarMap, linear, lstm};
use gr_core::CoreError;
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Poids du réseau (safetensors).
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// Architecture et mapping des genres (JSON).
pub const META_FILE: &str = "model.json";

/// Architecture hyperparameters, stored next to the weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Time steps per input (MFCC frames per segment).
    pub input_frames: usize,
    /// Features per time step (MFCC coefficients).
    pub input_coeffs: usize,
    pub lstm_units: usize,
    pub dense_units: usize,
    pub dropout: f32,
    pub num_classes: usize,
}

/// One row of the model summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: &'static str,
    pub kind: &'static str,
    /// Output shape without the batch dimension.
    pub output: Vec<usize>,
    pub params: usize,
}

impl ModelSpec {
    /// Parameter count per layer, in forward order.
    ///
    /// Each LSTM carries separate input and recurrent biases.
    #[must_use]
    pub fn layers(&self) -> Vec<LayerInfo> {
        let h = self.lstm_units;
        let lstm_params = |input: usize| 4 * h * (input + h) + 8 * h;
        let layer = |name, kind, output, params| LayerInfo {
            name,
            kind,
            output,
            params,
        };
        vec![
            layer(
                "lstm",
                "LSTM",
                vec![self.input_frames, h],
                lstm_params(self.input_coeffs),
            ),
            layer("lstm_1", "LSTM", vec![h], lstm_params(h)),
            layer(
                "dense",
                "Dense",
                vec![self.dense_units],
                h * self.dense_units + self.dense_units,
            ),
            layer("dropout", "Dropout", vec![self.dense_units], 0),
            layer(
                "dense_1",
                "Dense",
                vec![self.num_classes],
                self.dense_units * self.num_classes + self.num_classes,
            ),
        ]
    }
}

#[derive(Serialize, Deserialize)]
struct ModelMeta {
    spec: ModelSpec,
    mapping: Vec<String>,
}

/// Classifieur récurrent : LSTM → LSTM → Dense(ReLU) → Dropout → Dense.
///
/// The first LSTM emits its full output sequence, the second only its last
/// hidden state. The output layer yields logits; [`GenreRnn::predict_proba`]
/// applies the softmax.
pub struct GenreRnn {
    spec: ModelSpec,
    varmap: VarMap,
    device: Device,
    lstm1: LSTM,
    lstm2: LSTM,
    dense: Linear,
    output: Linear,
}

impl GenreRnn {
    /// Build the layers with candle's default initialisation.
    ///
    /// # Errors
    /// Returns an error if a parameter tensor cannot be allocated.
    pub fn new(spec: ModelSpec, device: &Device) -> candle_core::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let lstm1 = lstm(
            spec.input_coeffs,
            spec.lstm_units,
            LSTMConfig::default(),
            vb.pp("lstm1"),
        )?;
        let lstm2 = lstm(
            spec.lstm_units,
            spec.lstm_units,
            LSTMConfig::default(),
            vb.pp("lstm2"),
        )?;
        let dense = linear(spec.lstm_units, spec.dense_units, vb.pp("dense"))?;
        let output = linear(spec.dense_units, spec.num_classes, vb.pp("output"))?;
        Ok(Self {
            spec,
            varmap,
            device: device.clone(),
            lstm1,
            lstm2,
            dense,
            output,
        })
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Trainable variables, for the optimizer.
    #[must_use]
    pub fn vars(&self) -> Vec<candle_core::Var> {
        self.varmap.all_vars()
    }

    #[must_use]
    pub fn num_params(&self) -> usize {
        self.vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Re-draw every parameter from `rng`.
    ///
    /// Matrices get Glorot-uniform values, biases zeros, except the LSTM
    /// forget-gate input bias which starts at 1. Variables are visited in
    /// name order so a given seed always yields the same network.
    ///
    /// # Errors
    /// Returns an error if the variable store is poisoned or a tensor
    /// cannot be written.
    pub fn init_weights(&self, rng: &mut StdRng) -> candle_core::Result<()> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| candle_core::Error::Msg("VarMap verrouillée (poisoned)".into()))?;
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();

        for name in names {
            let Some(var) = data.get(name) else {
                continue;
            };
            let dims = var.dims().to_vec();
            let values: Vec<f32> = match dims.as_slice() {
                &[rows, cols] => {
                    let limit = (6.0 / (rows + cols) as f64).sqrt() as f32;
                    (0..rows * cols)
                        .map(|_| rng.gen_range(-limit..limit))
                        .collect()
                }
                &[len] if name.ends_with("bias_ih_l0") => {
                    // Gate order i, f, g, o.
                    let h = len / 4;
                    (0..len)
                        .map(|i| if (h..2 * h).contains(&i) { 1.0 } else { 0.0 })
                        .collect()
                }
                _ => vec![0.0; var.elem_count()],
            };
            var.set(&Tensor::from_vec(values, dims, &self.device)?)?;
        }
        Ok(())
    }

    /// Inference forward pass, logits of shape (batch, classes).
    ///
    /// # Errors
    /// Returns an error if `xs` is not (batch, frames, coeffs) or has no
    /// time steps.
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.dense_activations(xs)?;
        self.output.forward(&hidden)
    }

    /// Training forward pass with inverted dropout drawn from `rng`.
    ///
    /// # Errors
    /// Same conditions as [`GenreRnn::forward`].
    pub fn forward_train(&self, xs: &Tensor, rng: &mut StdRng) -> candle_core::Result<Tensor> {
        let hidden = self.dense_activations(xs)?;
        let p = self.spec.dropout;
        let hidden = if p > 0.0 {
            let keep = 1.0 - p;
            let scale = 1.0 / keep;
            let mask: Vec<f32> = (0..hidden.elem_count())
                .map(|_| if rng.gen_bool(f64::from(keep)) { scale } else { 0.0 })
                .collect();
            let mask = Tensor::from_vec(mask, hidden.dims(), &self.device)?;
            hidden.mul(&mask)?
        } else {
            hidden
        };
        self.output.forward(&hidden)
    }

    /// Class probabilities, shape (batch, classes), rows summing to 1.
    ///
    /// # Errors
    /// Same conditions as [`GenreRnn::forward`].
    pub fn predict_proba(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        candle_nn::ops::softmax(&self.forward(xs)?, D::Minus1)
    }

    fn dense_activations(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (_, frames, _) = xs.dims3()?;
        if frames == 0 {
            candle_core::bail!("séquence vide : aucune trame MFCC");
        }
        let states = self.lstm1.seq(xs)?;
        let sequence = self.lstm1.states_to_tensor(&states)?;
        let states = self.lstm2.seq(&sequence)?;
        let Some(last) = states.last() else {
            candle_core::bail!("séquence vide : aucune trame MFCC");
        };
        self.dense.forward(last.h())?.relu()
    }

    /// Tableau récapitulatif des couches, façon Keras.
    #[must_use]
    pub fn summary(&self) -> String {
        let rule = "_".repeat(65);
        let double = "=".repeat(65);
        let mut out = format!(
            "Model: \"genre_rnn\"\n{rule}\n {:<28}{:<26}{}\n{double}\n",
            "Layer (type)", "Output Shape", "Param #"
        );
        let layers = self.spec.layers();
        let total: usize = layers.iter().map(|l| l.params).sum();
        for l in layers {
            let dims: Vec<String> = l.output.iter().map(ToString::to_string).collect();
            out.push_str(&format!(
                " {:<28}{:<26}{}\n",
                format!("{} ({})", l.name, l.kind),
                format!("(None, {})", dims.join(", ")),
                l.params
            ));
        }
        out.push_str(&format!(
            "{double}\nTotal params: {total}\nTrainable params: {total}\nNon-trainable params: 0\n{rule}"
        ));
        out
    }

    /// Write the weights and the architecture/mapping sidecar into `dir`.
    ///
    /// # Errors
    /// Returns an error if the directory or either file cannot be written.
    pub fn save(&self, dir: &Path, mapping: &[String]) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Impossible de créer {}", dir.display()))?;
        self.varmap.save(dir.join(WEIGHTS_FILE))?;
        let meta = ModelMeta {
            spec: self.spec.clone(),
            mapping: mapping.to_vec(),
        };
        let json = serde_json::to_string_pretty(&meta)?;
        fs::write(dir.join(META_FILE), json)
            .with_context(|| format!("Impossible d'écrire {}", dir.join(META_FILE).display()))?;
        log::info!("Modèle sauvegardé dans {}", dir.display());
        Ok(())
    }

    /// Rebuild a model saved by [`GenreRnn::save`], with its genre mapping.
    ///
    /// # Errors
    /// Returns `CoreError::FileNotFound` if either file is missing, or an
    /// error if they cannot be parsed or do not match each other.
    pub fn load(dir: &Path, device: &Device) -> Result<(Self, Vec<String>)> {
        let meta_path = dir.join(META_FILE);
        let weights_path = dir.join(WEIGHTS_FILE);
        for path in [&meta_path, &weights_path] {
            if !path.exists() {
                return Err(CoreError::FileNotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
        }
        let raw = fs::read_to_string(&meta_path)?;
        let meta: ModelMeta = serde_json::from_str(&raw)
            .with_context(|| format!("Métadonnées invalides : {}", meta_path.display()))?;
        let mut model = Self::new(meta.spec, device)?;
        model
            .varmap
            .load(&weights_path)
            .with_context(|| format!("Poids invalides : {}", weights_path.display()))?;
        log::info!(
            "Modèle chargé : {} paramètres, {} genres",
            model.num_params(),
            meta.mapping.len()
        );
        Ok((model, meta.mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn spec() -> ModelSpec {
        ModelSpec {
            input_frames: 6,
            input_coeffs: 4,
            lstm_units: 8,
            dense_units: 5,
            dropout: 0.3,
            num_classes: 3,
        }
    }

    fn input(batch: usize) -> Tensor {
        let data: Vec<f32> = (0..batch * 6 * 4).map(|i| (i as f32 * 0.37).sin()).collect();
        Tensor::from_vec(data, (batch, 6, 4), &Device::Cpu).unwrap()
    }

    fn seeded(seed: u64) -> GenreRnn {
        let model = GenreRnn::new(spec(), &Device::Cpu).unwrap();
        model.init_weights(&mut StdRng::seed_from_u64(seed)).unwrap();
        model
    }

    #[test]
    fn output_shape_and_probabilities() {
        let model = seeded(1);
        let probs = model.predict_proba(&input(2)).unwrap();
        assert_eq!(probs.dims(), &[2, 3]);
        for row in probs.to_vec2::<f32>().unwrap() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn param_count_matches_layer_table() {
        let model = seeded(1);
        let table: usize = spec().layers().iter().map(|l| l.params).sum();
        assert_eq!(model.num_params(), table);
        assert!(model.summary().contains(&format!("Total params: {table}")));
    }

    #[test]
    fn same_seed_same_network() {
        let a = seeded(42).forward(&input(1)).unwrap().to_vec2::<f32>().unwrap();
        let b = seeded(42).forward(&input(1)).unwrap().to_vec2::<f32>().unwrap();
        let c = seeded(43).forward(&input(1)).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn dropout_only_in_training() {
        let model = seeded(7);
        let xs = input(4);
        let eval_a = model.forward(&xs).unwrap().to_vec2::<f32>().unwrap();
        let eval_b = model.forward(&xs).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(eval_a, eval_b);

        let mut rng = StdRng::seed_from_u64(0);
        let t1 = model.forward_train(&xs, &mut rng).unwrap().to_vec2::<f32>().unwrap();
        let t2 = model.forward_train(&xs, &mut rng).unwrap().to_vec2::<f32>().unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn empty_sequence_is_an_error() {
        let model = seeded(1);
        let xs = Tensor::zeros((1, 0, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(model.forward(&xs).is_err());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = seeded(3);
        let mapping = vec!["blues".to_string(), "jazz".into(), "rock".into()];
        model.save(dir.path(), &mapping).unwrap();

        let (loaded, loaded_mapping) = GenreRnn::load(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(loaded_mapping, mapping);
        assert_eq!(loaded.spec(), model.spec());
        let xs = input(2);
        assert_eq!(
            model.forward(&xs).unwrap().to_vec2::<f32>().unwrap(),
            loaded.forward(&xs).unwrap().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn load_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = GenreRnn::load(&dir.path().join("absent"), &Device::Cpu);
        assert!(err.is_err());
    }
}
