use std::path::{Path, PathBuf};

use colorizers::network::DEFAULT_ANNEALING_SCALE;
use colorizers::{ModelArtifacts, SessionOptions};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::colorizer_service::OutputFormat;
use crate::errors::Result;

/// Looked up in the working directory when no explicit file is given.
pub const DEFAULT_CONFIG_NAME: &str = "imager";

pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://www.dropbox.com/s/dx0qvhhp5hbcx7z/colorization_release_v2.caffemodel?dl=1";

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub api: ApiSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "127.0.0.1".to_owned(),
            port: 5000,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    pub prefix: String,
    pub max_body_bytes: usize,
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub default_format: OutputFormat,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            prefix: "/api/colorizer/".to_owned(),
            max_body_bytes: 20 * 1024 * 1024,
            max_image_width: 8192,
            max_image_height: 8192,
            default_format: OutputFormat::Png,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSettings {
    pub directory: PathBuf,
    pub network: String,
    pub cluster_centers: String,
    pub annealing_scale: f32,
    pub intra_threads: usize,
    pub download_url: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            directory: PathBuf::from("model"),
            network: "colorization_release_v2.onnx".to_owned(),
            cluster_centers: "pts_in_hull.npy".to_owned(),
            annealing_scale: DEFAULT_ANNEALING_SCALE,
            intra_threads: 4,
            download_url: DEFAULT_DOWNLOAD_URL.to_owned(),
        }
    }
}

impl ModelSettings {
    pub fn artifacts(&self) -> ModelArtifacts {
        ModelArtifacts::new(
            self.directory.join(&self.network),
            self.directory.join(&self.cluster_centers),
            &self.download_url,
        )
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            intra_threads: self.intra_threads,
            annealing_scale: self.annealing_scale,
        }
    }
}

impl Settings {
    /// Merge defaults, the config file and `IMAGER_<SECTION>__<KEY>` environment variables.
    /// An explicit `path` must exist; the default `imager.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("IMAGER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
