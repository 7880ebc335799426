use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage};
use num_traits::cast::ToPrimitive;
use num_traits::{Float, NumCast};

/// Clip a unit-range sample to `[0, 1]` and scale it to a byte.
/// Truncates like a float to `u8` cast; NaN maps to 0.
pub fn to_byte<T: Float + ToPrimitive>(sample: T) -> u8 {
    let clipped = sample.max(T::zero()).min(T::one());
    let scaled = clipped * <T as NumCast>::from(255u8).unwrap_or_else(T::one);
    scaled.to_u8().unwrap_or(0)
}

/// Quantize a float RGB image in `[0, 1]` to 8 bits per channel.
pub fn quantize(image: &Rgb32FImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let data = image.as_raw().iter().map(|&s| to_byte(s)).collect::<Vec<_>>();
    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data)
        .unwrap_or_else(|| ImageBuffer::new(width, height))
}
