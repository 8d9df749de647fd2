use candle_core::{Device, Tensor};
use gr_core::Dataset;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::TrainError;

/// Feature matrices flattened into one contiguous N × frames × coeffs buffer.
///
/// # Example
/// ```
/// use gr_core::Dataset;
/// use gr_train::Samples;
/// let mut ds = Dataset::new(vec!["a".into(), "b".into()]);
/// ds.push(vec![vec![1.0, 2.0]; 3], 0);
/// ds.push(vec![vec![3.0, 4.0]; 3], 1);
/// let samples = Samples::from_dataset(&ds).unwrap();
/// assert_eq!(samples.len(), 2);
/// assert_eq!(samples.shape(), (3, 2));
/// assert_eq!(samples.sample(1)[0], 3.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Samples {
    data: Vec<f32>,
    labels: Vec<u32>,
    frames: usize,
    coeffs: usize,
}

impl Samples {
    /// Flatten a validated dataset.
    ///
    /// # Errors
    /// Returns an error if the dataset breaks its invariants or is empty.
    pub fn from_dataset(dataset: &Dataset) -> anyhow::Result<Self> {
        dataset.validate()?;
        let (frames, coeffs) = dataset.shape().ok_or(TrainError::EmptyDataset)?;
        let mut data = Vec::with_capacity(dataset.len() * frames * coeffs);
        for matrix in &dataset.mfcc {
            for row in matrix {
                data.extend_from_slice(row);
            }
        }
        Ok(Self {
            data,
            labels: dataset.labels.clone(),
            frames,
            coeffs,
        })
    }

    /// Unlabelled samples (label 0) from matrices of identical shape.
    ///
    /// # Errors
    /// Returns `TrainError::ShapeMismatch` if a matrix differs from the first.
    pub fn from_matrices(matrices: &[Vec<Vec<f32>>]) -> Result<Self, TrainError> {
        let first = matrices.first().ok_or(TrainError::EmptyDataset)?;
        let frames = first.len();
        let coeffs = first.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(matrices.len() * frames * coeffs);
        for matrix in matrices {
            let found = (matrix.len(), matrix.first().map_or(0, Vec::len));
            if found != (frames, coeffs) || matrix.iter().any(|r| r.len() != coeffs) {
                return Err(TrainError::ShapeMismatch {
                    expected: (frames, coeffs),
                    found,
                });
            }
            for row in matrix {
                data.extend_from_slice(row);
            }
        }
        Ok(Self {
            data,
            labels: vec![0; matrices.len()],
            frames,
            coeffs,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// (frames, coefficients) of every sample.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.frames, self.coeffs)
    }

    #[must_use]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Flattened frames × coeffs features of sample `i`.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn sample(&self, i: usize) -> &[f32] {
        let stride = self.frames * self.coeffs;
        &self.data[i * stride..(i + 1) * stride]
    }

    /// Copy of the samples at `indices`, in that order.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.frames * self.coeffs);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            data.extend_from_slice(self.sample(i));
            labels.push(self.labels[i]);
        }
        Self {
            data,
            labels,
            frames: self.frames,
            coeffs: self.coeffs,
        }
    }

    /// Inputs (B × frames × coeffs, f32) and targets (B, u32) for a batch.
    ///
    /// # Errors
    /// Returns an error if tensor allocation fails.
    pub fn batch(&self, indices: &[usize], device: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let mut data = Vec::with_capacity(indices.len() * self.frames * self.coeffs);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            data.extend_from_slice(self.sample(i));
            labels.push(self.labels[i]);
        }
        let xs = Tensor::from_vec(data, (indices.len(), self.frames, self.coeffs), device)?;
        let ys = Tensor::from_vec(labels, indices.len(), device)?;
        Ok((xs, ys))
    }
}

/// Train / validation / test partitions.
#[derive(Clone, Debug)]
pub struct Splits {
    pub train: Samples,
    pub validation: Samples,
    pub test: Samples,
}

/// Shuffle, then hold out `ceil(test_size * n)` samples.
///
/// Returns (kept, held_out).
///
/// # Errors
/// Returns `TrainError::EmptySplit` if either side would be empty.
pub fn train_test_split(
    samples: &Samples,
    test_size: f64,
    split: &'static str,
    rng: &mut StdRng,
) -> Result<(Samples, Samples), TrainError> {
    let n = samples.len();
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainError::EmptySplit {
            split,
            total: n,
            fraction: test_size.to_string(),
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let (held, kept) = order.split_at(n_test);
    Ok((samples.subset(kept), samples.subset(held)))
}

/// Split off the test set, then the validation set from what remains.
///
/// # Errors
/// Returns `TrainError::EmptySplit` if any partition would be empty.
pub fn prepare_splits(
    samples: &Samples,
    test_size: f64,
    validation_size: f64,
    rng: &mut StdRng,
) -> Result<Splits, TrainError> {
    let (train, test) = train_test_split(samples, test_size, "test", rng)?;
    let (train, validation) = train_test_split(&train, validation_size, "validation", rng)?;
    log::info!(
        "Découpage : {} entraînement, {} validation, {} test",
        train.len(),
        validation.len(),
        test.len()
    );
    Ok(Splits {
        train,
        validation,
        test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn numbered(n: usize) -> Samples {
        let mut ds = Dataset::new(vec!["a".into(), "b".into()]);
        for i in 0..n {
            ds.push(vec![vec![i as f32; 2]; 3], (i % 2) as u32);
        }
        Samples::from_dataset(&ds).unwrap()
    }

    #[test]
    fn split_sizes_follow_ceil_rule() {
        let samples = numbered(100);
        let mut rng = StdRng::seed_from_u64(1);
        let splits = prepare_splits(&samples, 0.25, 0.2, &mut rng).unwrap();
        assert_eq!(splits.test.len(), 25);
        assert_eq!(splits.validation.len(), 15);
        assert_eq!(splits.train.len(), 60);
    }

    #[test]
    fn split_is_a_partition() {
        let samples = numbered(40);
        let mut rng = StdRng::seed_from_u64(9);
        let splits = prepare_splits(&samples, 0.25, 0.2, &mut rng).unwrap();
        let mut ids: Vec<u32> = [&splits.train, &splits.validation, &splits.test]
            .iter()
            .flat_map(|s| (0..s.len()).map(|i| s.sample(i)[0] as u32).collect::<Vec<_>>())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..40).collect::<Vec<u32>>());
    }

    #[test]
    fn same_seed_same_split() {
        let samples = numbered(50);
        let a = prepare_splits(&samples, 0.25, 0.2, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = prepare_splits(&samples, 0.25, 0.2, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a.test, b.test);
        assert_eq!(a.train, b.train);
    }

    #[test]
    fn labels_travel_with_samples() {
        let samples = numbered(30);
        let mut rng = StdRng::seed_from_u64(3);
        let (train, test) = train_test_split(&samples, 0.3, "test", &mut rng).unwrap();
        for s in [&train, &test] {
            for i in 0..s.len() {
                let id = s.sample(i)[0] as u32;
                assert_eq!(s.labels()[i], id % 2);
            }
        }
    }

    #[test]
    fn too_small_dataset_is_rejected() {
        let samples = numbered(1);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            train_test_split(&samples, 0.25, "test", &mut rng),
            Err(TrainError::EmptySplit { split: "test", .. })
        ));
    }

    #[test]
    fn batch_tensor_shapes() {
        let samples = numbered(5);
        let (xs, ys) = samples.batch(&[4, 0, 2], &Device::Cpu).unwrap();
        assert_eq!(xs.dims(), &[3, 3, 2]);
        assert_eq!(ys.to_vec1::<u32>().unwrap(), vec![0, 0, 0]);
        let first = xs.get(0).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(first.iter().all(|&v| (v - 4.0).abs() < f32::EPSILON));
    }

    #[test]
    fn from_matrices_rejects_ragged_input() {
        let err = Samples::from_matrices(&[vec![vec![0.0; 2]; 3], vec![vec![0.0; 2]; 4]]);
        assert!(matches!(err, Err(TrainError::ShapeMismatch { .. })));
    }
}
