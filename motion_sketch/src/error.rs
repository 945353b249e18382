// THEORY:
// Errors in the sketch are narrow. Nearly all of them originate at the video
// acquisition boundary or while loading configuration. The per-frame core
// (differ, pool, index, geometry) never returns an error: contract violations
// there are programming mistakes and panic through `assert!` instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the sketch engine and its collaborators.
#[derive(Debug, Error)]
pub enum SketchError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to acquire video source '{source_desc}': {reason}")]
    Acquisition { source_desc: String, reason: String },

    #[error("failed to decode image '{path}': {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("acquisition task was cancelled before completing")]
    AcquisitionCancelled,
}

pub type Result<T> = std::result::Result<T, SketchError>;
