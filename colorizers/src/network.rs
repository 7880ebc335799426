//! Model artifacts and the forward pass of the colorization network.
//!
//! The network classifies every output location into one of the quantized
//! (a, b) bins of the cluster-center table. Its class scores are turned into
//! chroma values with the annealed mean: a softmax over the scaled scores
//! followed by the expectation over the bin centers.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{s, Array2, Array3, Array4, ArrayView3, ArrayViewD, Axis, Ix3};
use ndarray_npy::{read_npy, ReadNpyError};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::{debug, info};

use crate::errors::{ColorizerError, Result};

/// Scale applied to the class scores before the softmax (inverse annealing temperature).
pub const DEFAULT_ANNEALING_SCALE: f32 = 2.606;

/// Turns a mean-centered lightness tensor into predicted chroma.
pub trait ChromaPredictor {
    /// `lightness` is `1 x 1 x H x W`; the result is `2 x h x w` (a then b).
    fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>>;
}

impl<P: ChromaPredictor + ?Sized> ChromaPredictor for Box<P> {
    fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>> {
        (**self).predict(lightness)
    }
}

/// Files the network is loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifacts {
    pub model: PathBuf,
    pub cluster_centers: PathBuf,
    pub download_url: String,
}

impl ModelArtifacts {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(model: P, cluster_centers: Q, download_url: &str) -> Self {
        ModelArtifacts {
            model: model.into(),
            cluster_centers: cluster_centers.into(),
            download_url: download_url.to_owned(),
        }
    }

    /// Check that the weights file exists.
    pub fn verify(&self) -> Result<()> {
        if !self.model.is_file() {
            return Err(ColorizerError::MissingModel {
                path: self.model.clone(),
                download_url: self.download_url.clone(),
            });
        }
        Ok(())
    }
}

/// The quantized (a, b) bin centers, one row per bin.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCenters {
    points: Array2<f32>,
}

impl ClusterCenters {
    /// `points` must be `bins x 2`.
    pub fn from_points(points: Array2<f32>) -> Result<Self> {
        if points.ncols() != 2 || points.nrows() == 0 {
            return Err(ColorizerError::ShapeError {
                shape: points.shape().to_vec(),
                expected: "cluster centers must be N x 2",
            });
        }
        Ok(ClusterCenters { points })
    }

    /// Load the table from a `.npy` file holding `i64`, `f64` or `f32`
    /// values, shaped `N x 2` or `2 x N`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let points = read_points(path)?;
        let points = if points.ncols() != 2 && points.nrows() == 2 {
            points.reversed_axes().as_standard_layout().into_owned()
        } else {
            points
        };
        debug!("loaded {} cluster centers from {:?}", points.nrows(), path);
        Self::from_points(points)
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Annealed-mean decoding of `bins x h x w` class scores into `2 x h x w` chroma.
    pub fn decode(&self, scores: ArrayView3<f32>, scale: f32) -> Result<Array3<f32>> {
        let (bins, height, width) = scores.dim();
        if bins != self.len() {
            return Err(ColorizerError::ShapeError {
                shape: scores.shape().to_vec(),
                expected: "one score plane per cluster center",
            });
        }

        let mut ab = Array3::<f32>::zeros((2, height, width));
        for y in 0..height {
            for x in 0..width {
                let column = scores.slice(s![.., y, x]);
                let peak = column.fold(f32::NEG_INFINITY, |m, &v| m.max(v * scale));
                let (mut total, mut a, mut b) = (0.0f32, 0.0f32, 0.0f32);
                for (center, &score) in self.points.outer_iter().zip(column.iter()) {
                    let weight = (score * scale - peak).exp();
                    total += weight;
                    a += weight * center[0];
                    b += weight * center[1];
                }
                ab[[0, y, x]] = a / total;
                ab[[1, y, x]] = b / total;
            }
        }
        Ok(ab)
    }
}

fn read_points(path: &Path) -> Result<Array2<f32>> {
    match read_npy::<_, Array2<i64>>(path) {
        Ok(points) => return Ok(points.mapv(|v| v as f32)),
        Err(ReadNpyError::Io(e)) => return Err(e.into()),
        Err(_) => {}
    }
    match read_npy::<_, Array2<f64>>(path) {
        Ok(points) => return Ok(points.mapv(|v| v as f32)),
        Err(ReadNpyError::Io(e)) => return Err(e.into()),
        Err(_) => {}
    }
    Ok(read_npy::<_, Array2<f32>>(path)?)
}

/// Options for building the inference session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub intra_threads: usize,
    pub annealing_scale: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            intra_threads: 4,
            annealing_scale: DEFAULT_ANNEALING_SCALE,
        }
    }
}

/// ONNX Runtime backed predictor.
pub struct OnnxPredictor {
    session: Mutex<Session>,
    centers: ClusterCenters,
    annealing_scale: f32,
}

impl OnnxPredictor {
    /// Load the network and the cluster centers. Fails with
    /// `MissingModel` before touching the runtime if the weights are absent.
    pub fn load(artifacts: &ModelArtifacts, options: SessionOptions) -> Result<Self> {
        artifacts.verify()?;
        let centers = ClusterCenters::load(&artifacts.cluster_centers)?;

        let session = Session::builder()
            .map_err(|e| ColorizerError::runtime("Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ColorizerError::runtime("Failed to set optimization level", e))?
            .with_intra_threads(options.intra_threads)
            .map_err(|e| ColorizerError::runtime("Failed to set thread count", e))?
            .commit_from_file(&artifacts.model)
            .map_err(|e| {
                ColorizerError::runtime(&format!("Failed to load model {}", artifacts.model.display()), e)
            })?;

        info!(
            "loaded colorization network {:?} ({} cluster centers)",
            artifacts.model,
            centers.len()
        );

        Ok(OnnxPredictor {
            session: Mutex::new(session),
            centers,
            annealing_scale: options.annealing_scale,
        })
    }
}

impl ChromaPredictor for OnnxPredictor {
    fn predict(&self, lightness: Array4<f32>) -> Result<Array3<f32>> {
        let input = Tensor::from_array(lightness)
            .map_err(|e| ColorizerError::runtime("Failed to create input tensor", e))?;

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| ColorizerError::runtime("Session lock poisoned", e))?;
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| ColorizerError::runtime("Inference failed", e))?;
            let view: ArrayViewD<f32> = outputs[0]
                .try_extract_array()
                .map_err(|e| ColorizerError::runtime("Failed to extract tensor", e))?;
            view.to_owned()
        };

        chroma_from_output(output.view(), &self.centers, self.annealing_scale)
    }
}

/// Interpret a raw network output of shape `1 x C x h x w`. Two channels are
/// already chroma; one channel per cluster center is decoded with the annealed mean.
pub fn chroma_from_output(
    output: ArrayViewD<f32>,
    centers: &ClusterCenters,
    scale: f32,
) -> Result<Array3<f32>> {
    let shape = output.shape().to_vec();
    if shape.len() != 4 || shape[0] != 1 {
        return Err(ColorizerError::ShapeError {
            shape,
            expected: "network output must be 1 x C x h x w",
        });
    }
    let output = output
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<Ix3>()
        .map_err(|e| ColorizerError::runtime("Unexpected output layout", e))?;

    match output.len_of(Axis(0)) {
        2 => Ok(output.to_owned()),
        n if n == centers.len() => centers.decode(output, scale),
        _ => Err(ColorizerError::ShapeError {
            shape,
            expected: "2 chroma planes or one plane per cluster center",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};
    use ndarray_npy::write_npy;

    fn centers() -> ClusterCenters {
        ClusterCenters::from_points(arr2(&[[-40.0f32, 20.0], [0.0, 0.0], [60.0, -30.0]])).unwrap()
    }

    #[test]
    fn uniform_scores_give_the_mean_center() {
        let scores = Array3::<f32>::zeros((3, 2, 2));
        let ab = centers().decode(scores.view(), DEFAULT_ANNEALING_SCALE).unwrap();
        assert_eq!(ab.dim(), (2, 2, 2));
        for v in ab.index_axis(Axis(0), 0).iter() {
            assert!((v - 20.0 / 3.0).abs() < 1e-4);
        }
        for v in ab.index_axis(Axis(0), 1).iter() {
            assert!((v + 10.0 / 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn a_dominant_bin_wins() {
        let mut scores = Array3::<f32>::zeros((3, 1, 1));
        scores[[2, 0, 0]] = 50.0;
        let ab = centers().decode(scores.view(), DEFAULT_ANNEALING_SCALE).unwrap();
        assert!((ab[[0, 0, 0]] - 60.0).abs() < 1e-3);
        assert!((ab[[1, 0, 0]] + 30.0).abs() < 1e-3);
    }

    #[test]
    fn large_scores_do_not_overflow() {
        let scores = Array3::<f32>::from_elem((3, 1, 1), 1.0e4);
        let ab = centers().decode(scores.view(), DEFAULT_ANNEALING_SCALE).unwrap();
        assert!(ab.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn bin_count_must_match() {
        let scores = Array3::<f32>::zeros((4, 1, 1));
        assert!(matches!(
            centers().decode(scores.view(), 1.0),
            Err(ColorizerError::ShapeError { .. })
        ));
    }

    #[test]
    fn two_channel_output_passes_through() {
        let mut output = ndarray::Array4::<f32>::zeros((1, 2, 3, 3));
        output[[0, 0, 1, 1]] = -12.5;
        output[[0, 1, 2, 0]] = 40.0;
        let ab = chroma_from_output(output.view().into_dyn(), &centers(), DEFAULT_ANNEALING_SCALE).unwrap();
        assert_eq!(ab.dim(), (2, 3, 3));
        assert_eq!(ab[[0, 1, 1]], -12.5);
        assert_eq!(ab[[1, 2, 0]], 40.0);
    }

    #[test]
    fn class_scores_are_decoded() {
        let mut output = ndarray::Array4::<f32>::zeros((1, 3, 2, 2));
        output[[0, 0, 0, 1]] = 50.0;
        let ab = chroma_from_output(output.view().into_dyn(), &centers(), DEFAULT_ANNEALING_SCALE).unwrap();
        assert_eq!(ab.dim(), (2, 2, 2));
        assert!((ab[[0, 0, 1]] + 40.0).abs() < 1e-3);
        assert!((ab[[1, 0, 1]] - 20.0).abs() < 1e-3);
        assert!((ab[[0, 0, 0]] - 20.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn unexpected_outputs_are_rejected() {
        let centers = centers();
        let wrong_channels = ndarray::Array4::<f32>::zeros((1, 5, 2, 2)).into_dyn();
        let wrong_rank = Array3::<f32>::zeros((2, 2, 2)).into_dyn();
        let batched = ndarray::Array4::<f32>::zeros((2, 2, 2, 2)).into_dyn();
        for output in [wrong_channels, wrong_rank, batched] {
            assert!(matches!(
                chroma_from_output(output.view(), &centers, DEFAULT_ANNEALING_SCALE),
                Err(ColorizerError::ShapeError { .. })
            ));
        }
    }

    #[test]
    fn loads_integer_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pts_in_hull.npy");
        write_npy(&path, &arr2(&[[-90i64, 50], [-90, 60], [10, -10]])).unwrap();
        let centers = ClusterCenters::load(&path).unwrap();
        assert_eq!(centers.len(), 3);
    }

    #[test]
    fn loads_transposed_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pts.npy");
        write_npy(&path, &arr2(&[[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]])).unwrap();
        let centers = ClusterCenters::load(&path).unwrap();
        assert_eq!(centers.len(), 3);
        assert_eq!(centers.points[[2, 0]], 3.0);
        assert_eq!(centers.points[[2, 1]], 6.0);
    }

    #[test]
    fn missing_table_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClusterCenters::load(dir.path().join("absent.npy"));
        assert!(matches!(result, Err(ColorizerError::IoError(_))));
    }

    #[test]
    fn missing_weights_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ModelArtifacts::new(
            dir.path().join("colorization_release_v2.onnx"),
            dir.path().join("pts_in_hull.npy"),
            "https://example.org/model",
        );
        match OnnxPredictor::load(&artifacts, SessionOptions::default()) {
            Err(ColorizerError::MissingModel { path, download_url }) => {
                assert_eq!(path, artifacts.model);
                assert_eq!(download_url, "https://example.org/model");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("loading without weights must fail"),
        }
    }
}
