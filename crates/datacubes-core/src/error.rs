//! Error types for datacubes-rs.

use thiserror::Error;

/// The main error type for datacubes-rs operations.
#[derive(Error, Debug)]
pub enum DatacubesError {
    /// No datacube with the given id is known to the scene.
    #[error("datacube {0} not found")]
    DatacubeNotFound(u32),

    /// A drag or resize gesture currently owns the scene.
    #[error("datacube updates are rejected while a drag or resize is active")]
    GestureActive,

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A mesh asset could not be loaded.
    #[error("failed to load asset '{uri}': {reason}")]
    AssetLoadError { uri: String, reason: String },

    /// Rendering error.
    #[error("render error: {0}")]
    RenderError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for datacubes-rs operations.
pub type Result<T> = std::result::Result<T, DatacubesError>;
