use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// MFCC dataset shared between the extractor and the trainer.
///
/// Serialised as `{"mapping": [...], "mfcc": [...], "labels": [...]}`.
/// Each `mfcc` entry is a frames × coefficients matrix and `labels[i]` is the
/// index into `mapping` of the genre that produced `mfcc[i]`.
///
/// # Example
/// ```
/// use gr_core::Dataset;
/// let mut ds = Dataset::new(vec!["blues".into(), "jazz".into()]);
/// ds.push(vec![vec![0.0; 13]; 130], 1);
/// assert_eq!(ds.len(), 1);
/// assert_eq!(ds.shape(), Some((130, 13)));
/// assert!(ds.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Genre names, in label order.
    pub mapping: Vec<String>,
    /// One frames × coefficients matrix per kept segment.
    pub mfcc: Vec<Vec<Vec<f32>>>,
    /// Genre index of each matrix.
    pub labels: Vec<u32>,
}

impl Dataset {
    /// Empty dataset over the given genre mapping.
    #[must_use]
    pub fn new(mapping: Vec<String>) -> Self {
        Self {
            mapping,
            mfcc: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Append one segment's feature matrix with its label.
    pub fn push(&mut self, matrix: Vec<Vec<f32>>, label: u32) {
        self.mfcc.push(matrix);
        self.labels.push(label);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mfcc.len()
    }

    /// `true` when no segment was kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mfcc.is_empty()
    }

    /// Number of genre classes, i.e. the mapping length.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.mapping.len()
    }

    /// (frames, coefficients) of the first matrix, `None` for an empty dataset.
    #[must_use]
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.mfcc
            .first()
            .map(|m| (m.len(), m.first().map_or(0, Vec::len)))
    }

    /// Check every structural invariant of the record.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.mfcc.len() != self.labels.len() {
            return Err(DatasetError::LengthMismatch {
                mfcc: self.mfcc.len(),
                labels: self.labels.len(),
            });
        }

        let classes = self.mapping.len();
        if let Some((index, &label)) = self
            .labels
            .iter()
            .enumerate()
            .find(|&(_, &l)| l as usize >= classes)
        {
            return Err(DatasetError::LabelOutOfRange {
                index,
                label,
                classes,
            });
        }

        let Some(expected) = self.shape() else {
            return Ok(());
        };
        for (index, matrix) in self.mfcc.iter().enumerate() {
            let frames = matrix.len();
            if frames == 0 || matrix.iter().any(Vec::is_empty) {
                return Err(DatasetError::EmptyMatrix { index });
            }
            // Every row, not only the first, must carry the same coefficient count.
            if let Some(row) = matrix.iter().find(|r| r.len() != expected.1) {
                return Err(DatasetError::RaggedShape {
                    index,
                    expected,
                    found: (frames, row.len()),
                });
            }
            if frames != expected.0 {
                return Err(DatasetError::RaggedShape {
                    index,
                    expected,
                    found: (frames, expected.1),
                });
            }
        }
        Ok(())
    }

    /// Write the whole record as JSON indented with four spaces.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Impossible de créer {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.serialize(&mut ser)
            .with_context(|| format!("Erreur de sérialisation JSON vers {}", path.display()))?;
        writer.flush()?;

        log::info!(
            "Dataset écrit : {} segments, {} genres -> {}",
            self.len(),
            self.num_classes(),
            path.display()
        );
        Ok(())
    }

    /// Read a record and check its invariants.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or is inconsistent.
    pub fn load_json(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Impossible de lire {}", path.display()))?;
        let dataset: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Erreur de parsing JSON dans {}", path.display()))?;
        dataset
            .validate()
            .with_context(|| format!("Dataset incohérent : {}", path.display()))?;
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_genres() -> Dataset {
        let mut ds = Dataset::new(vec!["blues".into(), "jazz".into()]);
        ds.push(vec![vec![1.0, 2.0, 3.0]; 4], 0);
        ds.push(vec![vec![4.0, 5.0, 6.0]; 4], 1);
        ds
    }

    #[test]
    fn valid_dataset_passes() {
        let ds = two_genres();
        assert!(ds.validate().is_ok());
        assert_eq!(ds.num_classes(), 2);
        assert_eq!(ds.shape(), Some((4, 3)));
    }

    #[test]
    fn empty_dataset_is_valid() {
        let ds = Dataset::new(vec!["rock".into()]);
        assert!(ds.validate().is_ok());
        assert!(ds.is_empty());
        assert_eq!(ds.shape(), None);
    }

    #[test]
    fn length_mismatch_detected() {
        let mut ds = two_genres();
        ds.labels.pop();
        assert_eq!(
            ds.validate(),
            Err(DatasetError::LengthMismatch { mfcc: 2, labels: 1 })
        );
    }

    #[test]
    fn label_out_of_range_detected() {
        let mut ds = two_genres();
        ds.labels[1] = 2;
        assert_eq!(
            ds.validate(),
            Err(DatasetError::LabelOutOfRange {
                index: 1,
                label: 2,
                classes: 2
            })
        );
    }

    #[test]
    fn ragged_frames_detected() {
        let mut ds = two_genres();
        ds.push(vec![vec![0.0; 3]; 5], 0);
        assert!(matches!(
            ds.validate(),
            Err(DatasetError::RaggedShape { index: 2, .. })
        ));
    }

    #[test]
    fn ragged_row_detected() {
        let mut ds = two_genres();
        ds.mfcc[1][2] = vec![0.0; 2];
        assert_eq!(
            ds.validate(),
            Err(DatasetError::RaggedShape {
                index: 1,
                expected: (4, 3),
                found: (4, 2)
            })
        );
    }

    #[test]
    fn json_uses_original_keys_and_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        two_genres().save_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"mapping\": ["));
        assert!(text.contains("\n    \"mfcc\": ["));
        assert!(text.contains("\n    \"labels\": ["));

        let loaded = Dataset::load_json(&path).unwrap();
        assert_eq!(loaded, two_genres());
    }

    #[test]
    fn load_rejects_inconsistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"mapping": ["a"], "mfcc": [[[0.0]]], "labels": [3]}"#,
        )
        .unwrap();
        let err = Dataset::load_json(&path).unwrap_err();
        assert!(err.downcast_ref::<DatasetError>().is_some());
    }
}
