//! Coordinate frame from anatomical landmarks.

use loci_core::image::ImageMetadata;
use loci_core::spatial::{Direction3, Point3, Vector3};
use loci_core::{LociError, Result};
use loci_model::LandmarkPrediction;

/// Norm below which a landmark ray is treated as degenerate.
pub const DEGENERATE_NORM: f64 = 1e-9;

/// Landmarks in the voxel space of the preprocessed grid.
///
/// `ac` is a voxel position. `nose` and `top` are directions from the grid's
/// index origin; only their orientation matters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkTriplet {
    pub ac: Point3,
    pub nose: Vector3,
    pub top: Vector3,
}

impl LandmarkTriplet {
    /// Scale a network prediction onto a grid of `size` voxels `(x, y, z)`.
    pub fn from_prediction(prediction: &LandmarkPrediction, size: [usize; 3]) -> Self {
        let [sx, sy, sz] = size.map(|n| n as f64);
        let [ax, ay, az] = prediction.ac;
        Self {
            ac: Point3::new([ax * sx, ay * sy, az * sz]),
            nose: Vector3::new(prediction.nose),
            top: Vector3::new(prediction.top),
        }
    }
}

/// New physical origin and orientation for a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateFrame {
    pub origin: Point3,
    pub direction: Direction3,
}

/// Solves the canonical frame of a volume from its landmarks.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateFrameSolver {
    epsilon: f64,
}

impl Default for CoordinateFrameSolver {
    fn default() -> Self {
        Self {
            epsilon: DEGENERATE_NORM,
        }
    }
}

impl CoordinateFrameSolver {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Place the AC at the physical origin with axes aligned to the
    /// nose/vertex landmarks.
    ///
    /// Landmarks are given in the voxel space of `preprocessed`; the returned
    /// frame applies to a volume with `original` geometry. Rows of the new
    /// rotation are `[-(nose × top), -nose, top]` after orthogonalising the
    /// nose ray against the vertex ray, composed with the original direction.
    pub fn solve(
        &self,
        landmarks: &LandmarkTriplet,
        preprocessed: &ImageMetadata<3>,
        original: &ImageMetadata<3>,
    ) -> Result<CoordinateFrame> {
        let ac_physical = preprocessed.index_to_physical(&landmarks.ac);
        let ac_voxel = original.physical_to_index(&ac_physical)?;

        let nose = preprocessed.index_vector_to_physical(&landmarks.nose);
        let top = preprocessed.index_vector_to_physical(&landmarks.top);

        let top_normal = top
            .try_normalize(self.epsilon)
            .ok_or_else(|| LociError::computation("degenerate vertex landmark: zero-length ray"))?;
        let nose_residual = nose - top_normal * nose.dot(&top_normal);
        let nose_normal = nose_residual.try_normalize(self.epsilon).ok_or_else(|| {
            LociError::computation("degenerate nose landmark: ray parallel to vertex ray")
        })?;
        let ortho = nose_normal.cross(&top_normal);

        let direction = Direction3::from_rows([-ortho, -nose_normal, top_normal]) * *original.direction();
        let origin = Point3::from(-(direction * original.spacing().component_mul(&ac_voxel.coords())));

        tracing::debug!(
            ac_voxel = ?ac_voxel.to_array(),
            origin = ?origin.to_array(),
            "solved coordinate frame"
        );
        Ok(CoordinateFrame { origin, direction })
    }
}
