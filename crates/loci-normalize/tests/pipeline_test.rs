use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use loci_core::image::{Image, ImageMetadata};
use loci_core::spatial::{Direction3, Point3, Spacing3, Vector3};
use loci_core::{LociError, Result};
use loci_model::{LandmarkPrediction, LandmarkPredictor, WarpInputs, WarpPredictor};
use loci_normalize::{
    CropWindow, NiftiArtifactSink, NonlinearWarper, NormalizationMode, NormalizationOrchestrator, RigidAligner,
};

type Backend = NdArray<f32>;

/// Always predicts the grid centre with an upright head.
struct FixedLandmarks {
    calls: Arc<AtomicUsize>,
}

impl LandmarkPredictor<Backend> for FixedLandmarks {
    fn predict(&self, input: Tensor<Backend, 5>) -> Result<LandmarkPrediction> {
        assert_eq!(input.dims(), [1, 1, 64, 64, 64]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LandmarkPrediction {
            ac: [0.5, 0.5, 0.5],
            nose: [0.0, 1.0, 0.0],
            top: [0.0, 0.0, 1.0],
        })
    }
}

/// Identity warp.
struct PassThroughWarp;

impl WarpPredictor<Backend> for PassThroughWarp {
    fn predict(&self, inputs: WarpInputs<Backend>) -> Result<Tensor<Backend, 5>> {
        assert_eq!(inputs.raw.dims(), inputs.template.dims());
        assert_eq!(inputs.moving.dims(), inputs.template.dims());
        Ok(inputs.raw)
    }
}

/// Returns a tensor one voxel short along x.
struct TruncatingWarp;

impl WarpPredictor<Backend> for TruncatingWarp {
    fn predict(&self, inputs: WarpInputs<Backend>) -> Result<Tensor<Backend, 5>> {
        let [n, c, d, h, w] = inputs.raw.dims();
        Ok(inputs.raw.slice([0..n, 0..c, 0..d, 0..h, 0..w - 1]))
    }
}

fn subject() -> Image<Backend, 3> {
    let device = Default::default();
    let n = 20;
    let mut values = vec![0.0f32; n * n * n];
    for z in 5..15 {
        for y in 4..16 {
            for x in 6..14 {
                values[(z * n + y) * n + x] = 50.0 + x as f32;
            }
        }
    }
    let meta = ImageMetadata::new(Point3::new([-20.0, -20.0, -20.0]), Spacing3::uniform(2.0), Direction3::identity());
    Image::from_values(values, [n, n, n], &meta, &device).unwrap()
}

fn template() -> Image<Backend, 3> {
    let device = Default::default();
    let meta = ImageMetadata::new(Point3::new([-16.0, -24.0, -16.0]), Spacing3::uniform(2.0), Direction3::identity());
    Image::from_values(vec![1.0; 16 * 24 * 16], [16, 24, 16], &meta, &device).unwrap()
}

fn crop() -> CropWindow {
    CropWindow {
        start: [2, 4, 2],
        size: [12, 16, 12],
    }
}

fn orchestrator<W: WarpPredictor<Backend>>(
    warp: W,
) -> (NormalizationOrchestrator<Backend, FixedLandmarks, W>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let aligner = RigidAligner::new(FixedLandmarks { calls: calls.clone() }, template());
    let warper = NonlinearWarper::new(warp, template(), crop()).unwrap();
    (NormalizationOrchestrator::new(aligner, warper), calls)
}

#[test]
fn test_standard_mode_reframes_without_touching_voxels() {
    let (pipeline, calls) = orchestrator(PassThroughWarp);
    let input = subject();
    let result = pipeline.normalize(input.clone(), NormalizationMode::Standard).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.rigid_aligned.to_values().unwrap(), input.to_values().unwrap());
    assert!(result.iterations.is_none());

    let expected_rows = [
        Vector3::new([-1.0, 0.0, 0.0]),
        Vector3::new([0.0, -1.0, 0.0]),
        Vector3::new([0.0, 0.0, 1.0]),
    ];
    for (r, expected) in expected_rows.iter().enumerate() {
        let row = result.rigid_aligned.direction().row(r);
        assert!((row - *expected).norm() < 1e-9);
    }
}

#[test]
fn test_normalized_volume_is_cropped_template_window() {
    let (pipeline, _) = orchestrator(PassThroughWarp);
    let result = pipeline.normalize(subject(), NormalizationMode::Standard).unwrap();
    let template = template();

    assert_eq!(result.normalized.size(), [12, 16, 12]);
    assert_eq!(*result.normalized.spacing(), *template.spacing());
    assert_eq!(*result.normalized.direction(), *template.direction());

    let expected_origin = template.transform_continuous_index_to_physical_point(&Point3::new([2.0, 4.0, 2.0]));
    assert!(result.normalized.origin().distance(&expected_origin) < 1e-9);
}

#[test]
fn test_manual_fov_skips_rigid_alignment() {
    let (pipeline, calls) = orchestrator(PassThroughWarp);
    let input = subject();
    let result = pipeline.normalize(input.clone(), NormalizationMode::ManualFov).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.rigid_aligned.origin(), input.origin());
    assert_eq!(result.rigid_aligned.direction(), input.direction());
    assert_eq!(result.normalized.size(), [12, 16, 12]);
}

#[test]
fn test_iterative_mode_persists_scratch_volume() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (pipeline, calls) = orchestrator(PassThroughWarp);
    let pipeline = pipeline.with_scratch(Arc::new(NiftiArtifactSink::directory(dir.path())));

    let mode = NormalizationMode::Iterative {
        max_iterations: 2,
        threshold_mm: 0.5,
    };
    let result = pipeline.normalize(subject(), mode)?;
    let report = result.iterations.expect("iterative mode reports iterations");

    assert!(report.iterations >= 1 && report.iterations <= 2);
    assert_eq!(calls.load(Ordering::SeqCst), report.iterations + 1);
    assert!(dir.path().join("rigid_iter.nii").exists());
    Ok(())
}

#[test]
fn test_debug_artifacts_are_written() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (pipeline, _) = orchestrator(PassThroughWarp);
    let pipeline = pipeline.with_debug(Arc::new(NiftiArtifactSink::prefixed(dir.path().join("subject"))));

    pipeline.normalize(subject(), NormalizationMode::Standard)?;

    for tag in ["rigid", "rigid_preprocessed", "elastic_preprocessed"] {
        assert!(dir.path().join(format!("subject_{}.nii", tag)).exists(), "missing {}", tag);
    }
    Ok(())
}

#[test]
fn test_warp_output_must_match_template_grid() {
    let (pipeline, _) = orchestrator(TruncatingWarp);
    let result = pipeline.normalize(subject(), NormalizationMode::ManualFov);
    assert!(matches!(result, Err(LociError::ShapeMismatch { .. })));
}

#[test]
fn test_crop_window_must_fit_template() {
    let window = CropWindow {
        start: [8, 16, 8],
        size: [79, 95, 79],
    };
    let result = NonlinearWarper::new(PassThroughWarp, template(), window);
    assert!(matches!(result, Err(LociError::Configuration(_))));
}
