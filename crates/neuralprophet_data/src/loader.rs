//! Batched iteration over a [`TimeDataset`].

use burn::prelude::*;
use ndarray::{Array2, Array3, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::dataset::TimeDataset;
use crate::error::{DataError, Result};
use neuralprophet_core::{Seed, Split};

/// Model inputs and targets of one batch, on a Burn device.
///
/// Shapes use `N` for the batch size, `F` for `n_forecasts` and `L` for
/// `n_lags`.
#[derive(Debug, Clone)]
pub struct TimeBatch<B: Backend> {
    /// Normalized time of each target `[N, F]`.
    pub time: Tensor<B, 2>,
    /// Fourier features per seasonality `[N, F, D]`.
    pub seasonalities: Vec<Tensor<B, 3>>,
    /// Lagged `y_scaled` `[N, L]`, absent without lags.
    pub lags: Option<Tensor<B, 2>>,
    /// Lagged covariates, one tensor per covariate.
    pub covariates: Vec<Tensor<B, 2>>,
    /// Event window features `[N, F, offsets]`, one tensor per event.
    pub events: Vec<Tensor<B, 3>>,
    /// Future regressors `[N, F]`, one tensor per regressor.
    pub regressors: Vec<Tensor<B, 2>>,
    /// Targets `[N, F]`.
    pub targets: Tensor<B, 2>,
    /// Positions of the samples in the dataset.
    pub indices: Vec<usize>,
}

fn rows2<B: Backend>(arr: &Array2<f32>, rows: &[usize], device: &B::Device) -> Tensor<B, 2> {
    let picked = arr.select(Axis(0), rows);
    let cols = picked.ncols();
    let flat: Vec<f32> = picked.iter().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), cols])
}

fn rows3<B: Backend>(arr: &Array3<f32>, rows: &[usize], device: &B::Device) -> Tensor<B, 3> {
    let picked = arr.select(Axis(0), rows);
    let (_, d1, d2) = picked.dim();
    let flat: Vec<f32> = picked.iter().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), d1, d2])
}

impl<B: Backend> TimeBatch<B> {
    /// Gather the samples at `indices` into tensors.
    ///
    /// # Errors
    ///
    /// Returns an error if `indices` is empty or out of range.
    pub fn from_dataset(dataset: &TimeDataset, indices: &[usize], device: &B::Device) -> Result<Self> {
        if indices.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= dataset.len()) {
            return Err(DataError::InvalidInput(format!(
                "sample index {bad} out of range for {} samples",
                dataset.len()
            )));
        }
        let lags = (dataset.layout().n_lags > 0).then(|| rows2(dataset.lags(), indices, device));
        Ok(Self {
            time: rows2(dataset.time(), indices, device),
            seasonalities: dataset.seasonalities().iter().map(|a| rows3(a, indices, device)).collect(),
            lags,
            covariates: dataset.covariates().iter().map(|a| rows2(a, indices, device)).collect(),
            events: dataset.events().iter().map(|a| rows3(a, indices, device)).collect(),
            regressors: dataset.regressors().iter().map(|a| rows2(a, indices, device)).collect(),
            targets: rows2(dataset.targets(), indices, device),
            indices: indices.to_vec(),
        })
    }

    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A dataloader that produces batches from a dataset.
///
/// Supports shuffling with a seed so that every epoch visits the samples
/// in a reproducible order.
///
/// # Example
///
/// ```rust,ignore
/// use neuralprophet_core::Seed;
/// use neuralprophet_data::{TimeDataLoader, TimeDataset};
///
/// let dataset = TimeDataset::new(&frame, &layout, false)?;
/// let loader = TimeDataLoader::builder(dataset)
///     .batch_size(32)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()?;
///
/// for batch in loader.iter_epoch::<B>(&device, 0) {
///     let batch = batch?;
/// }
/// ```
pub struct TimeDataLoader {
    dataset: TimeDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
    split: Split,
}

impl TimeDataLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: TimeDataset) -> TimeDataLoaderBuilder {
        TimeDataLoaderBuilder::new(dataset)
    }

    /// Get the dataset.
    #[must_use]
    pub fn dataset(&self) -> &TimeDataset {
        &self.dataset
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the number of batches.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Get the total number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Get the data split type.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Iterate over the batches of the first epoch.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device) -> TimeDataLoaderIter<'_, B> {
        self.iter_epoch(device, 0)
    }

    /// Iterate over the batches of `epoch`.
    ///
    /// With a seed, each epoch draws its shuffle from its own ChaCha stream.
    #[must_use]
    pub fn iter_epoch<B: Backend>(&self, device: &B::Device, epoch: usize) -> TimeDataLoaderIter<'_, B> {
        TimeDataLoaderIter::new(self, device.clone(), epoch)
    }
}

/// Builder for TimeDataLoader.
pub struct TimeDataLoaderBuilder {
    dataset: TimeDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
    split: Split,
}

impl TimeDataLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: TimeDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: None,
            split: Split::Train,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the data split type.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is 0 or the dataset is empty.
    pub fn build(self) -> Result<TimeDataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        Ok(TimeDataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            split: self.split,
        })
    }
}

/// Iterator over batches from a TimeDataLoader.
pub struct TimeDataLoaderIter<'a, B: Backend> {
    loader: &'a TimeDataLoader,
    device: B::Device,
    indices: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<'a, B: Backend> TimeDataLoaderIter<'a, B> {
    fn new(loader: &'a TimeDataLoader, device: B::Device, epoch: usize) -> Self {
        let n = loader.dataset.len();
        let mut indices: Vec<usize> = (0..n).collect();

        if loader.shuffle {
            let mut rng = if let Some(seed) = loader.seed {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.value());
                rng.set_stream(epoch as u64);
                rng
            } else {
                ChaCha8Rng::from_entropy()
            };
            indices.shuffle(&mut rng);
        }

        Self {
            loader,
            device,
            indices,
            current_batch: 0,
            n_batches: loader.n_batches(),
        }
    }
}

impl<'a, B: Backend> Iterator for TimeDataLoaderIter<'a, B> {
    type Item = Result<TimeBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }

        let start = self.current_batch * self.loader.batch_size;
        let end = std::cmp::min(start + self.loader.batch_size, self.indices.len());
        self.current_batch += 1;

        Some(TimeBatch::from_dataset(
            &self.loader.dataset,
            &self.indices[start..end],
            &self.device,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<'a, B: Backend> ExactSizeIterator for TimeDataLoaderIter<'a, B> {}
