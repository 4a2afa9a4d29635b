//! Error types for volume streaming

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("dataset directory is empty: {0}")]
    EmptyDirectory(PathBuf),

    #[error("dataset files do not share one extension: {0:?}")]
    MixedExtensions(Vec<String>),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("inconsistent format: {0}")]
    InconsistentFormat(String),

    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(String),

    #[error("directory does not contain required files: {0}")]
    MissingFiles(String),

    #[error("unsupported value for `{key}`: {value}")]
    UnsupportedValue { key: String, value: String },

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("brick payload has {actual} samples, expected {expected}")]
    PayloadSize { expected: usize, actual: usize },

    #[error("resolution level {level} out of range ({levels} levels known)")]
    LevelOutOfRange { level: u8, levels: usize },

    #[error("brick index {index} out of range for level {level}")]
    BrickIndexOutOfRange { index: u32, level: u8 },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
