use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration value or structure.
    #[error("Configuration invalide : {0}")]
    Config(String),

    /// Referenced file or directory does not exist.
    #[error("Fichier introuvable : {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },
}

/// A dataset record that breaks one of its structural invariants.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatasetError {
    /// `mfcc` and `labels` do not pair up.
    #[error("{mfcc} matrices MFCC pour {labels} labels")]
    LengthMismatch {
        /// Number of feature matrices.
        mfcc: usize,
        /// Number of labels.
        labels: usize,
    },

    /// A label does not index into `mapping`.
    #[error("Label {label} hors limites (entrée {index}, {classes} genres)")]
    LabelOutOfRange {
        /// Position of the offending entry.
        index: usize,
        /// The label value.
        label: u32,
        /// Length of the mapping.
        classes: usize,
    },

    /// A feature matrix does not have the shape of the first one.
    #[error("Matrice {index} de forme {found:?}, attendu {expected:?}")]
    RaggedShape {
        /// Position of the offending entry.
        index: usize,
        /// (frames, coefficients) of the first matrix.
        expected: (usize, usize),
        /// (frames, coefficients) of this matrix.
        found: (usize, usize),
    },

    /// A feature matrix with no frames or no coefficients.
    #[error("Matrice {index} vide")]
    EmptyMatrix {
        /// Position of the offending entry.
        index: usize,
    },
}
