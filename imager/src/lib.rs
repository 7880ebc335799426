pub mod colorizer_service;
pub mod errors;
pub mod logger;
pub mod server;
pub mod settings;

pub use colorizer_service::{ColorizeQuery, ColorizerService, OutputFormat, OutputMode, ResourceInfo};
pub use errors::{ImagerError, Result};
pub use settings::Settings;
