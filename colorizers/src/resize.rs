//! Bilinear resampling of `f32` planes.
//!
//! Samples are half-pixel centered and every output reads a 2x2 source
//! neighbourhood, without any widening of the kernel on downscale. Values
//! are never clamped, so Lab planes keep their native ranges.

use ndarray::{Array2, ArrayView2};

#[derive(Debug, Clone, Copy)]
struct Tap {
    lo: usize,
    hi: usize,
    weight: f32,
}

fn taps(src: usize, dst: usize) -> Vec<Tap> {
    let scale = src as f32 / dst as f32;
    (0..dst)
        .map(|d| {
            let pos = (d as f32 + 0.5) * scale - 0.5;
            let (lo, weight) = if pos < 0.0 {
                (0, 0.0)
            } else {
                (pos.floor() as usize, pos - pos.floor())
            };
            if lo + 1 >= src {
                Tap { lo: src - 1, hi: src - 1, weight: 0.0 }
            } else {
                Tap { lo, hi: lo + 1, weight }
            }
        })
        .collect()
}

/// Resize `src` (rows x cols) to `height x width`. An empty source yields zeros.
pub fn bilinear(src: ArrayView2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (rows, cols) = src.dim();
    if rows == 0 || cols == 0 {
        return Array2::zeros((height, width));
    }
    let ys = taps(rows, height);
    let xs = taps(cols, width);

    Array2::from_shape_fn((height, width), |(y, x)| {
        let (ty, tx) = (ys[y], xs[x]);
        let top = src[[ty.lo, tx.lo]] * (1.0 - tx.weight) + src[[ty.lo, tx.hi]] * tx.weight;
        let bottom = src[[ty.hi, tx.lo]] * (1.0 - tx.weight) + src[[ty.hi, tx.hi]] * tx.weight;
        top * (1.0 - ty.weight) + bottom * ty.weight
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    #[test]
    fn upscale_interpolates_between_centers() {
        let src = arr2(&[[0.0f32, 10.0]]);
        let out = bilinear(src.view(), 1, 4);
        assert_eq!(out, arr2(&[[0.0, 2.5, 7.5, 10.0]]));
    }

    #[test]
    fn downscale_point_samples() {
        let src = arr2(&[[0.0f32, 10.0, 20.0, 30.0]]);
        let out = bilinear(src.view(), 1, 2);
        assert_eq!(out, arr2(&[[5.0, 25.0]]));
    }

    #[test]
    fn keeps_values_outside_the_unit_range() {
        let src = arr2(&[[-100.0f32, 120.0], [80.0, -60.0]]);
        let out = bilinear(src.view(), 6, 6);
        assert_eq!(out[[0, 0]], -100.0);
        assert_eq!(out[[0, 5]], 120.0);
        assert_eq!(out[[5, 0]], 80.0);
        assert_eq!(out[[5, 5]], -60.0);
        assert!(out.iter().all(|v| (-100.0..=120.0).contains(v)));
    }

    #[test]
    fn same_size_is_identity() {
        let src = Array2::from_shape_fn((5, 7), |(y, x)| (y * 7 + x) as f32 * 3.5 - 40.0);
        assert_eq!(bilinear(src.view(), 5, 7), src);
    }

    #[test]
    fn single_pixel_source_fills_the_output() {
        let src = arr2(&[[42.0f32]]);
        let out = bilinear(src.view(), 3, 2);
        assert!(out.iter().all(|&v| v == 42.0));
    }
}
