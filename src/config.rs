//! Run configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the benchmark layout, 32x32 crops, 43 classes)
//! 2. An optional TOML file
//! 3. Environment variables prefixed `SIGNPREP`, sections split by `__`
//!    (e.g. `SIGNPREP__IMAGE__WIDTH=48`)
//!
//! Command-line flags are applied on top by the binary.

use crate::core_modules::sample::{ChannelOrder, ImageDims};
use crate::error::{PrepError, PrepResult};
use config::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where the annotated images live and how they are labelled
    pub dataset: DatasetConfig,
    /// Output crop geometry
    pub image: ImageConfig,
    /// Worker pool sizing
    pub processing: ProcessingConfig,
    /// Archive destinations and encoding
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub train_root: PathBuf,
    pub test_root: PathBuf,
    pub num_classes: u32,
    /// Expected number of training rows; a mismatch is logged.
    pub train_size: Option<usize>,
    /// Expected number of test rows; a mismatch is logged.
    pub test_size: Option<usize>,
    /// Also run histogram equalization on the test split.
    pub equalize_test: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_root: PathBuf::from("GTSRB/Final_Training/Images"),
            test_root: PathBuf::from("GTSRB/Final_Test/Images"),
            num_classes: 43,
            train_size: None,
            test_size: None,
            equalize_test: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    pub channel_order: ChannelOrder,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            channel_order: ChannelOrder::Bgr,
        }
    }
}

impl ImageConfig {
    pub fn dims(&self) -> ImageDims {
        ImageDims::color(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker threads; one per logical CPU when unset.
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub train_archive: PathBuf,
    pub test_archive: PathBuf,
    /// gzip level, 0-9
    pub compression_level: u32,
    pub shuffle_train: bool,
    /// Shuffle seed; a fresh random seed is drawn when unset.
    pub seed: Option<u64>,
    pub preview_dir: Option<PathBuf>,
    pub preview_count: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            train_archive: PathBuf::from("traffic_sign_train_dataset.bin.gz"),
            test_archive: PathBuf::from("traffic_sign_test_dataset.bin.gz"),
            compression_level: 5,
            shuffle_train: true,
            seed: None,
            preview_dir: None,
            preview_count: 16,
        }
    }
}

impl Settings {
    /// Loads defaults, then `path` (if any), then `SIGNPREP__*` variables.
    pub fn load(path: Option<&Path>) -> PrepResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as `load`, reading variables from `env` instead of the process
    /// environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> PrepResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("SIGNPREP")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .source(env),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.image.width == 0 || self.image.height == 0 {
            return Err(PrepError::Settings(format!(
                "image size must be non-zero, got {}x{}",
                self.image.width, self.image.height
            )));
        }
        if self.dataset.num_classes == 0 {
            return Err(PrepError::Settings("num_classes must be at least 1".into()));
        }
        if self.output.compression_level > 9 {
            return Err(PrepError::Settings(format!(
                "compression_level must be 0-9, got {}",
                self.output.compression_level
            )));
        }
        if self.processing.workers == Some(0) {
            return Err(PrepError::Settings("workers must be at least 1".into()));
        }
        Ok(())
    }
}
