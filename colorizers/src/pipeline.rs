use image::imageops;
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4, Axis};
use tracing::debug;

use super::errors::{ColorizerError, Result};
use super::lab::{self, LabImage, Plane};
use super::network::ChromaPredictor;
use super::quantize::quantize;
use super::resize;
use super::Colorizer;

/// Side length of the square lightness input the network expects.
pub const NETWORK_INPUT_SIZE: u32 = 224;

/// Lightness is mean-centered around the middle of the L range before inference.
const LIGHTNESS_MEAN: f32 = 50.0;

/// The source image and its colorized counterpart, both 8 bits per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorizedImage {
    pub original: RgbImage,
    pub colorized: RgbImage,
}

impl ColorizedImage {
    /// Both images next to each other, original on the left.
    pub fn side_by_side(&self) -> RgbImage {
        let (width, height) = self.original.dimensions();
        let mut canvas = RgbImage::new(width * 2, height);
        imageops::replace(&mut canvas, &self.original, 0, 0);
        imageops::replace(&mut canvas, &self.colorized, i64::from(width), 0);
        canvas
    }
}

/// Colorizes images in Lab space: the original lightness is kept and the
/// chroma comes from the predictor.
pub struct LabColorizer<P> {
    predictor: P,
    input_size: u32,
}

impl<P: ChromaPredictor> LabColorizer<P> {
    pub fn new(predictor: P) -> Self {
        LabColorizer {
            predictor,
            input_size: NETWORK_INPUT_SIZE,
        }
    }

    pub fn with_input_size(predictor: P, input_size: u32) -> Self {
        LabColorizer { predictor, input_size }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    fn lightness_tensor(&self, lightness: &Plane) -> Array4<f32> {
        let side = self.input_size as usize;
        let resized = resize::bilinear(lightness.view(), side, side);
        Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| resized[[y, x]] - LIGHTNESS_MEAN)
    }
}

/// Resize one predicted chroma plane to the requested size.
fn chroma_plane(ab: &Array3<f32>, channel: usize, width: u32, height: u32) -> Plane {
    resize::bilinear(ab.index_axis(Axis(0), channel), height as usize, width as usize)
}

impl<P: ChromaPredictor> Colorizer for LabColorizer<P> {
    fn colorize(&self, image: &DynamicImage) -> Result<ColorizedImage> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ColorizerError::EmptyImage { width, height });
        }

        let lab = lab::rgb_to_lab(&image.to_rgb32f());
        let lightness = lab.lightness();

        let ab = self.predictor.predict(self.lightness_tensor(&lightness))?;
        if ab.len_of(Axis(0)) != 2 || ab.len_of(Axis(1)) == 0 || ab.len_of(Axis(2)) == 0 {
            return Err(ColorizerError::ShapeError {
                shape: ab.shape().to_vec(),
                expected: "chroma prediction must be 2 x h x w",
            });
        }
        debug!("predicted chroma {:?} for a {}x{} image", ab.shape(), width, height);

        let a = chroma_plane(&ab, 0, width, height);
        let b = chroma_plane(&ab, 1, width, height);
        let colorized = LabImage::from_planes(&lightness, &a, &b).ok_or(ColorizerError::ShapeError {
            shape: a.shape().to_vec(),
            expected: "resized chroma must match the input size",
        })?;

        Ok(ColorizedImage {
            original: image.to_rgb8(),
            colorized: quantize(&lab::lab_to_rgb(&colorized)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::cell::Cell;

    /// Predicts a fixed chroma at the quarter resolution of the input.
    struct ConstantChroma {
        a: f32,
        b: f32,
        calls: Cell<usize>,
    }

    impl ConstantChroma {
        fn new(a: f32, b: f32) -> Self {
            ConstantChroma { a, b, calls: Cell::new(0) }
        }
    }

    impl ChromaPredictor for ConstantChroma {
        fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>> {
            self.calls.set(self.calls.get() + 1);
            let (_, _, h, w) = lightness.dim();
            let mut ab = Array3::zeros((2, h / 4, w / 4));
            ab.index_axis_mut(Axis(0), 0).fill(self.a);
            ab.index_axis_mut(Axis(0), 1).fill(self.b);
            Ok(ab)
        }
    }

    /// Echoes the mean-centered lightness it was given into both chroma planes.
    struct Echo;

    impl ChromaPredictor for Echo {
        fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>> {
            let plane = lightness.index_axis(Axis(0), 0).to_owned();
            Ok(ndarray::concatenate(Axis(0), &[plane.view(), plane.view()]).unwrap())
        }
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 255) / width.max(1)) as u8;
            Rgb([v, v, ((y * 255) / height.max(1)) as u8])
        }))
    }

    #[test]
    fn keeps_the_input_dimensions() {
        let colorizer = LabColorizer::new(ConstantChroma::new(20.0, -15.0));
        for (w, h) in [(1, 1), (17, 5), (300, 120), (224, 224)] {
            let result = colorizer.colorize(&gradient(w, h)).unwrap();
            assert_eq!(result.original.dimensions(), (w, h));
            assert_eq!(result.colorized.dimensions(), (w, h));
        }
    }

    #[test]
    fn output_saturates_instead_of_wrapping() {
        let colorizer = LabColorizer::new(ConstantChroma::new(500.0, -500.0));
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([250, 250, 250])));
        let result = colorizer.colorize(&input).unwrap();
        let px = result.colorized.get_pixel(3, 3);
        assert_eq!(px[1], 0);
        assert_eq!(px[2], 255);
    }

    #[test]
    fn is_deterministic() {
        let colorizer = LabColorizer::new(Echo);
        let input = gradient(64, 40);
        let first = colorizer.colorize(&input).unwrap();
        let second = colorizer.colorize(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_chroma_keeps_grays_gray() {
        let colorizer = LabColorizer::new(ConstantChroma::new(0.0, 0.0));
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 6, Rgb([128, 128, 128])));
        let result = colorizer.colorize(&input).unwrap();
        for px in result.colorized.pixels() {
            assert!((i16::from(px[0]) - i16::from(px[1])).abs() <= 1);
            assert!((i16::from(px[1]) - i16::from(px[2])).abs() <= 1);
            assert!((i16::from(px[0]) - 128).abs() <= 1);
        }
    }

    #[test]
    fn lightness_is_mean_centered() {
        struct Inspect;
        impl ChromaPredictor for Inspect {
            fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>> {
                assert_eq!(lightness.dim(), (1, 1, NETWORK_INPUT_SIZE as usize, NETWORK_INPUT_SIZE as usize));
                assert!(lightness.iter().all(|v| (v - 50.0).abs() < 1e-2));
                Ok(Array3::zeros((2, 56, 56)))
            }
        }
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([255, 255, 255])));
        LabColorizer::new(Inspect).colorize(&white).unwrap();
    }

    #[test]
    fn lightness_keeps_its_range_through_the_downscale() {
        struct Inspect;
        impl ChromaPredictor for Inspect {
            fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>> {
                let side = NETWORK_INPUT_SIZE as usize;
                let left = lightness[[0, 0, side / 2, 0]];
                let right = lightness[[0, 0, side / 2, side - 1]];
                assert!(left < -45.0, "dark edge gave {}", left);
                assert!(right > 45.0, "bright edge gave {}", right);
                assert!(lightness.iter().any(|&v| v > -10.0 && v < 10.0));
                Ok(Array3::zeros((2, 56, 56)))
            }
        }
        let ramp = DynamicImage::ImageRgb8(RgbImage::from_fn(448, 30, |x, _| {
            let v = (x * 255 / 447) as u8;
            Rgb([v, v, v])
        }));
        LabColorizer::new(Inspect).colorize(&ramp).unwrap();
    }

    #[test]
    fn predicted_chroma_survives_the_upscale() {
        let colorizer = LabColorizer::new(ConstantChroma::new(60.0, -40.0));
        let gray = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 80, Rgb([128, 128, 128])));
        let result = colorizer.colorize(&gray).unwrap();
        for (x, y) in [(0, 0), (50, 40), (99, 79)] {
            let px = result.colorized.get_pixel(x, y);
            for (got, want) in px.0.iter().zip([193u8, 82, 198].iter()) {
                assert!((i16::from(*got) - i16::from(*want)).abs() <= 2, "pixel {:?}", px);
            }
        }
    }

    #[test]
    fn rejects_empty_images() {
        let colorizer = LabColorizer::new(ConstantChroma::new(0.0, 0.0));
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 4));
        assert!(matches!(
            colorizer.colorize(&empty),
            Err(ColorizerError::EmptyImage { width: 0, height: 4 })
        ));
        assert_eq!(colorizer.predictor.calls.get(), 0);
    }

    #[test]
    fn rejects_malformed_predictions() {
        struct ThreePlanes;
        impl ChromaPredictor for ThreePlanes {
            fn predict(&self, _: Array4<f32>) -> Result<Array3<f32>> {
                Ok(Array3::zeros((3, 4, 4)))
            }
        }
        let result = LabColorizer::new(ThreePlanes).colorize(&gradient(8, 8));
        assert!(matches!(result, Err(ColorizerError::ShapeError { .. })));
    }

    #[test]
    fn side_by_side_places_original_left() {
        let pair = ColorizedImage {
            original: RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])),
            colorized: RgbImage::from_pixel(3, 2, Rgb([9, 8, 7])),
        };
        let joined = pair.side_by_side();
        assert_eq!(joined.dimensions(), (6, 2));
        assert_eq!(joined.get_pixel(2, 1).0, [1, 2, 3]);
        assert_eq!(joined.get_pixel(3, 0).0, [9, 8, 7]);
    }
}
