use std::path::PathBuf;

use ndarray_npy::ReadNpyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ColorizerError>;

#[derive(Debug, Error)]
pub enum ColorizerError {
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    #[error("ImageError: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("NpyError: {0}")]
    NpyError(#[from] ReadNpyError),

    #[error(
        "Missing model file {}. Download it from {} and place it into your model folder",
        .path.display(),
        .download_url
    )]
    MissingModel { path: PathBuf, download_url: String },

    #[error("Inference runtime error: {message}")]
    RuntimeError { message: String },

    #[error("Unexpected tensor shape {shape:?}: {expected}")]
    ShapeError {
        shape: Vec<usize>,
        expected: &'static str,
    },

    #[error("The input image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

impl ColorizerError {
    pub(crate) fn runtime<E: std::fmt::Display>(context: &str, err: E) -> Self {
        ColorizerError::RuntimeError {
            message: format!("{}: {}", context, err),
        }
    }
}
