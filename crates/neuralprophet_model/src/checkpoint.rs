//! Saving and loading fitted models.
//!
//! A checkpoint directory holds two files:
//!
//! - `model.mpk`: the [`TimeNet`] record (burn named MessagePack, full precision)
//! - `metadata.json`: the [`TimeNetConfig`] needed to rebuild the module plus
//!   any serializable state of the caller (normalization, frequency, ...)
//!
//! # Example
//!
//! ```rust,ignore
//! use neuralprophet_model::checkpoint::{save_checkpoint, load_checkpoint, CheckpointMetadata};
//!
//! let metadata = CheckpointMetadata::new(config.clone()).with_state(&state)?;
//! save_checkpoint(&model, &metadata, "models/run1")?;
//!
//! let (model, metadata) = load_checkpoint::<NdArray>("models/run1", &device)?;
//! let state: MyState = metadata.state()?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use neuralprophet_core::Seed;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::time_net::{TimeNet, TimeNetConfig};

/// File stem of the model record; the recorder adds `.mpk`.
pub const MODEL_FILE: &str = "model";
/// Name of the metadata file.
pub const METADATA_FILE: &str = "metadata.json";
/// Version of the checkpoint layout.
pub const FORMAT_VERSION: u32 = 1;

/// Save a module record to `path`.
pub fn save_record<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), path.as_ref().to_path_buf())
        .map_err(|e| ModelError::Checkpoint(format!("failed to save {}: {e}", path.as_ref().display())))
}

/// Load a module record from `path`.
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(path.as_ref().to_path_buf(), device)
        .map_err(|e| ModelError::Checkpoint(format!("failed to load {}: {e}", path.as_ref().display())))
}

/// Everything besides the weights needed to restore a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Checkpoint layout version.
    pub format_version: u32,
    /// Module configuration.
    pub net: TimeNetConfig,
    /// Epochs trained.
    pub epoch: Option<usize>,
    /// Caller state.
    pub state: serde_json::Value,
    /// Additional metadata.
    pub extra: BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Create metadata for a module built from `net`.
    pub fn new(net: TimeNetConfig) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            net,
            epoch: None,
            state: serde_json::Value::Null,
            extra: BTreeMap::new(),
        }
    }

    /// Attach caller state.
    pub fn with_state<S: Serialize>(mut self, state: &S) -> Result<Self> {
        self.state = serde_json::to_value(state)?;
        Ok(self)
    }

    /// Set the number of epochs trained.
    #[must_use]
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Decode the caller state.
    pub fn state<S: DeserializeOwned>(&self) -> Result<S> {
        Ok(serde_json::from_value(self.state.clone())?)
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let metadata: Self = serde_json::from_str(&json)?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(ModelError::Checkpoint(format!(
                "unsupported checkpoint version {} (expected {FORMAT_VERSION})",
                metadata.format_version
            )));
        }
        Ok(metadata)
    }
}

fn model_path(dir: &Path) -> PathBuf {
    dir.join(MODEL_FILE)
}

/// Write `model` and `metadata` into `dir`, creating it if needed.
pub fn save_checkpoint<B: Backend>(
    model: &TimeNet<B>,
    metadata: &CheckpointMetadata,
    dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    model.save_checkpoint(model_path(dir))?;
    metadata.save(dir.join(METADATA_FILE))?;
    tracing::debug!("saved checkpoint to {}", dir.display());
    Ok(())
}

/// Restore a model and its metadata from `dir`.
pub fn load_checkpoint<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(TimeNet<B>, CheckpointMetadata)> {
    let dir = dir.as_ref();
    let metadata = CheckpointMetadata::load(dir.join(METADATA_FILE))?;
    let model = metadata
        .net
        .init::<B>(device, Seed::new(0))
        .load_checkpoint(model_path(dir), device)?;
    Ok((model, metadata))
}

/// Extension trait for modules to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the module to a record file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_record::<B, Self>(self, path)
    }

    /// Load weights from a record file into a copy of this module.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_record::<B, Self>(path, device)?;
        Ok(self.clone().load_record(record))
    }
}

impl<B: Backend> ModelCheckpoint<B> for TimeNet<B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trend::Growth;
    use burn_ndarray::NdArray;
    use neuralprophet_data::{ComponentMode, FeatureLayout};

    type TestBackend = NdArray<f32>;

    fn config() -> TimeNetConfig {
        TimeNetConfig {
            layout: FeatureLayout::new(3, 2),
            growth: Growth::Linear,
            changepoints: vec![0.25, 0.5],
            seasonality_mode: ComponentMode::Additive,
            num_hidden_layers: 1,
            d_hidden: 5,
        }
    }

    #[test]
    fn test_checkpoint_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = config().init::<TestBackend>(&device, Seed::new(42));
        let metadata = CheckpointMetadata::new(config())
            .with_state(&vec!["a".to_string()])
            .unwrap()
            .with_epoch(7)
            .with_extra("freq", "D");
        save_checkpoint(&model, &metadata, dir.path()).unwrap();

        let (loaded, meta) = load_checkpoint::<TestBackend>(dir.path(), &device).unwrap();
        let w = |m: &TimeNet<TestBackend>| -> Vec<f32> { m.ar_weights().unwrap().into_data().to_vec().unwrap() };
        assert_eq!(w(&model), w(&loaded));
        assert_eq!(meta.epoch, Some(7));
        assert_eq!(meta.extra["freq"], "D");
        assert_eq!(meta.state::<Vec<String>>().unwrap(), vec!["a".to_string()]);
        assert_eq!(meta.net, config());
    }

    #[test]
    fn test_missing_checkpoint_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_checkpoint::<TestBackend>(dir.path(), &Default::default()).is_err());
    }
}
