use thiserror::Error;

/// Errors originating from the training module.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrainError {
    /// The dataset has no entries.
    #[error("Dataset vide : rien à entraîner")]
    EmptyDataset,

    /// The configured output size disagrees with the genre mapping.
    #[error("Couche de sortie à {configured} classes pour {mapping} genres dans le dataset")]
    ClassCountMismatch {
        /// `train.num_classes` from the configuration.
        configured: usize,
        /// Length of the dataset mapping.
        mapping: usize,
    },

    /// A label cannot be produced by the output layer.
    #[error("Label {label} hors de la couche de sortie ({classes} classes)")]
    LabelOutOfRange {
        /// The label value.
        label: u32,
        /// Output layer size.
        classes: usize,
    },

    /// A split left one side without samples.
    #[error("Découpage {split} vide ({total} échantillons, fraction {fraction})")]
    EmptySplit {
        /// Which split failed ("test" or "validation").
        split: &'static str,
        /// Samples available before the split.
        total: usize,
        /// Requested held-out fraction.
        fraction: String,
    },

    /// Input features do not have the shape the model was built for.
    #[error("Forme d'entrée {found:?}, le modèle attend {expected:?}")]
    ShapeMismatch {
        /// (frames, coefficients) the model was built for.
        expected: (usize, usize),
        /// (frames, coefficients) received.
        found: (usize, usize),
    },
}
