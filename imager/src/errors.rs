use colorizers::ColorizerError;
use hyper::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImagerError>;

#[derive(Debug, Error)]
pub enum ImagerError {
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    #[error("ConfigError: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("HyperError: {0}")]
    HyperError(#[from] hyper::Error),

    #[error("{0}")]
    Colorizer(#[from] ColorizerError),

    #[error("ImageError: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("The request body is empty, expected an encoded image")]
    EmptyBody,

    #[error("The request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("The image exceeds the maximum of {max_width}x{max_height} pixels: {message}")]
    ImageTooLarge {
        message: String,
        max_width: u32,
        max_height: u32,
    },

    #[error("Failed to read the request body: {message}")]
    BodyError { message: String },

    #[error("Invalid value {value:?} for query parameter {param}")]
    InvalidParam { param: &'static str, value: String },

    #[error("There is no resource at {path}")]
    NotFound { path: String },

    #[error("Method {method} is not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("Colorization task failed: {message}")]
    TaskError { message: String },
}

impl ImagerError {
    /// The HTTP status reported to API clients for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ImagerError::EmptyBody
            | ImagerError::BodyError { .. }
            | ImagerError::InvalidParam { .. }
            | ImagerError::Colorizer(ColorizerError::ImageError(_))
            | ImagerError::Colorizer(ColorizerError::EmptyImage { .. }) => StatusCode::BAD_REQUEST,
            ImagerError::PayloadTooLarge { .. } | ImagerError::ImageTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ImagerError::NotFound { .. } => StatusCode::NOT_FOUND,
            ImagerError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
