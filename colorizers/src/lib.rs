pub use image::{DynamicImage, ImageBuffer, Pixel, RgbImage};

use std::path::Path;

pub mod errors;
pub mod lab;
pub mod network;
pub mod pipeline;
pub mod quantize;
pub mod resize;

pub use errors::{ColorizerError, Result};
pub use network::{ChromaPredictor, ClusterCenters, ModelArtifacts, OnnxPredictor, SessionOptions};
pub use pipeline::{ColorizedImage, LabColorizer, NETWORK_INPUT_SIZE};

pub trait Colorizer {
    /// Colorize a decoded image. The result has the dimensions of the input.
    fn colorize(&self, image: &DynamicImage) -> Result<ColorizedImage>;

    /// Decode the image at `path` and colorize it.
    fn colorize_path(&self, path: &Path) -> Result<ColorizedImage> {
        let image = image::open(path)?;
        self.colorize(&image)
    }

    /// Decode an in-memory encoded image and colorize it.
    fn colorize_bytes(&self, bytes: &[u8]) -> Result<ColorizedImage> {
        let image = image::load_from_memory(bytes)?;
        self.colorize(&image)
    }
}
