use anyhow::Result;

use crate::data::Samples;
use crate::model::GenreRnn;
use crate::trainer::check_shape;

/// Class probabilities and the winning class.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Index of the most probable class; ties go to the lowest index.
    pub index: usize,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Pick the most probable class. `None` for an empty distribution.
    ///
    /// # Example
    /// ```
    /// use gr_train::Prediction;
    /// let p = Prediction::from_probabilities(vec![0.2, 0.5, 0.5, 0.1]).unwrap();
    /// assert_eq!(p.index, 1);
    /// ```
    #[must_use]
    pub fn from_probabilities(probabilities: Vec<f32>) -> Option<Self> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in probabilities.iter().enumerate() {
            if best.is_none_or(|(_, b)| p > b) {
                best = Some((i, p));
            }
        }
        best.map(|(index, _)| Self {
            index,
            probabilities,
        })
    }

    /// Probability of the predicted class.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.probabilities.get(self.index).copied().unwrap_or(0.0)
    }

    /// Genre name of the predicted class.
    #[must_use]
    pub fn label<'a>(&self, mapping: &'a [String]) -> Option<&'a str> {
        mapping.get(self.index).map(String::as_str)
    }

    /// Printable genre of the predicted class, `#index` when unmapped.
    #[must_use]
    pub fn display_label(&self, mapping: &[String]) -> String {
        self.label(mapping)
            .map_or_else(|| format!("#{}", self.index), str::to_string)
    }
}

/// Genre name for class `index`, or `#index` when the mapping lacks it.
///
/// # Example
/// ```
/// use gr_train::predict::genre_label;
/// let mapping = vec!["blues".to_string(), "jazz".to_string()];
/// assert_eq!(genre_label(&mapping, 1), "jazz");
/// assert_eq!(genre_label(&mapping, 7), "#7");
/// ```
#[must_use]
pub fn genre_label(mapping: &[String], index: usize) -> String {
    mapping
        .get(index)
        .map_or_else(|| format!("#{index}"), String::clone)
}

/// Prediction for sample `index` of `samples`.
///
/// # Errors
/// Returns `TrainError::ShapeMismatch` if the samples do not fit the model,
/// or an error if `index` is out of range.
pub fn predict_sample(model: &GenreRnn, samples: &Samples, index: usize) -> Result<Prediction> {
    check_shape(model, samples)?;
    if index >= samples.len() {
        anyhow::bail!("Échantillon {index} hors limites ({} disponibles)", samples.len());
    }
    let (xs, _) = samples.batch(&[index], model.device())?;
    let probabilities = model.predict_proba(&xs)?.squeeze(0)?.to_vec1::<f32>()?;
    Prediction::from_probabilities(probabilities)
        .ok_or_else(|| anyhow::anyhow!("Le modèle n'a aucune classe de sortie"))
}

/// Whole-clip prediction: the mean of the per-segment probabilities.
///
/// Returns `None` when the clip produced no segment.
///
/// # Errors
/// Returns `TrainError::ShapeMismatch` if a segment does not fit the model.
pub fn classify_segments(
    model: &GenreRnn,
    segments: &[Vec<Vec<f32>>],
) -> Result<Option<Prediction>> {
    if segments.is_empty() {
        return Ok(None);
    }
    let samples = Samples::from_matrices(segments)?;
    check_shape(model, &samples)?;
    let indices: Vec<usize> = (0..samples.len()).collect();
    let (xs, _) = samples.batch(&indices, model.device())?;
    let mean = model.predict_proba(&xs)?.mean(0)?.to_vec1::<f32>()?;
    Ok(Prediction::from_probabilities(mean))
}

/// Prediction on one held-out sample, next to its true label.
#[derive(Clone, Debug, PartialEq)]
pub struct DemoPrediction {
    /// Position in the test set actually used.
    pub index: usize,
    pub expected: u32,
    pub prediction: Prediction,
}

/// Predict `test[requested]`, falling back to the last test sample when
/// `requested` is out of range. `None` for an empty test set.
///
/// # Errors
/// Same conditions as [`predict_sample`].
pub fn demo_prediction(
    model: &GenreRnn,
    test: &Samples,
    requested: usize,
) -> Result<Option<DemoPrediction>> {
    let Some(last) = test.len().checked_sub(1) else {
        return Ok(None);
    };
    let index = if requested > last {
        log::warn!(
            "Index de démonstration {requested} hors du jeu de test ({} échantillons), utilisation de {last}",
            test.len()
        );
        last
    } else {
        requested
    };
    let prediction = predict_sample(model, test, index)?;
    Ok(Some(DemoPrediction {
        index,
        expected: test.labels()[index],
        prediction,
    }))
}
