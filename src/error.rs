//! Error type shared by every stage of the preparation pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type PrepResult<T> = Result<T, PrepError>;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk annotation tree {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid annotation at {path} row {row}: {msg}")]
    Annotation { path: PathBuf, row: usize, msg: String },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("region of interest is empty for {path} after clamping to {width}x{height}")]
    EmptyRoi {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    #[error("class id {class_id} out of range for {num_classes} classes")]
    ClassOutOfRange { class_id: u32, num_classes: u32 },
    #[error("sample has {actual} values, expected {expected}")]
    SampleSize { expected: usize, actual: usize },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("archive codec error at {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("unsupported archive version {found} at {path}, expected {expected}")]
    ArchiveVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl PrepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Io {
            path: path.into(),
            source,
        }
    }
}
