//! Conversion between sRGB and CIE L*a*b* (D65 white point).
//!
//! Samples are `f32`: sRGB in `[0, 1]`, L in `[0, 100]`, a and b roughly in
//! `[-128, 127]`. The network was trained on this encoding, so the constants
//! follow the usual sRGB/D65 definitions exactly.

use image::{ImageBuffer, Rgb, Rgb32FImage};
use ndarray::Array2;

/// A single `f32` channel, rows x cols. Used for the L plane and the a/b planes.
pub type Plane = Array2<f32>;

const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240479, -1.537150, -0.498535],
    [-0.969256, 1.875991, 0.041556],
    [0.055648, -0.204043, 1.057311],
];

const EPSILON: f32 = 0.008856;
const SLOPE: f32 = 7.787;
const OFFSET: f32 = 16.0 / 116.0;

fn gamma_expand(c: f32) -> f32 {
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn gamma_compress(c: f32) -> f32 {
    if c > 0.0031308 {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * c
    }
}

fn f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        SLOPE * t + OFFSET
    }
}

fn f_inv(t: f32) -> f32 {
    let cube = t * t * t;
    if cube > EPSILON {
        cube
    } else {
        (t - OFFSET) / SLOPE
    }
}

fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Convert one sRGB sample (components in `[0, 1]`) to Lab.
pub fn srgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let linear = [gamma_expand(rgb[0]), gamma_expand(rgb[1]), gamma_expand(rgb[2])];
    let [x, y, z] = mul(&RGB_TO_XYZ, linear);

    let fx = f(x / WHITE_X);
    let fy = f(y);
    let fz = f(z / WHITE_Z);

    let l = if y > EPSILON { 116.0 * fy - 16.0 } else { 903.3 * y };
    [l, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Convert one Lab sample back to sRGB. The result is not clipped.
pub fn lab_to_srgb(lab: [f32; 3]) -> [f32; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let y = if lab[0] > 903.3 * EPSILON {
        fy * fy * fy
    } else {
        lab[0] / 903.3
    };
    let xyz = [f_inv(fx) * WHITE_X, y, f_inv(fz) * WHITE_Z];

    let [r, g, b] = mul(&XYZ_TO_RGB, xyz);
    [gamma_compress(r), gamma_compress(g), gamma_compress(b)]
}

/// An image in Lab space, stored as three `f32` samples per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    pixels: ImageBuffer<Rgb<f32>, Vec<f32>>,
}

impl LabImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels.get_pixel(x, y).0
    }

    /// The L plane.
    pub fn lightness(&self) -> Plane {
        let (width, height) = self.dimensions();
        Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            self.pixels.get_pixel(x as u32, y as u32)[0]
        })
    }

    /// Stack an L plane and two chroma planes. Returns `None` when the sizes differ.
    pub fn from_planes(l: &Plane, a: &Plane, b: &Plane) -> Option<Self> {
        let (rows, cols) = l.dim();
        if a.dim() != (rows, cols) || b.dim() != (rows, cols) {
            return None;
        }
        let pixels = ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
            let at = [y as usize, x as usize];
            Rgb([l[at], a[at], b[at]])
        });
        Some(LabImage { pixels })
    }
}

pub fn rgb_to_lab(image: &Rgb32FImage) -> LabImage {
    let (width, height) = image.dimensions();
    let pixels = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb(srgb_to_lab(image.get_pixel(x, y).0))
    });
    LabImage { pixels }
}

pub fn lab_to_rgb(image: &LabImage) -> Rgb32FImage {
    let (width, height) = image.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| Rgb(lab_to_srgb(image.get(x, y))))
}
