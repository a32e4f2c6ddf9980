//! Direction (orientation) matrices.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::Vector;

/// Orientation of the voxel axes in physical space.
///
/// Column `i` is the physical direction of voxel axis `i`. A valid image
/// direction is orthonormal; reflections (determinant −1) are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Build a direction from its rows.
    pub fn from_rows(rows: [Vector<D>; D]) -> Self {
        Self(SMatrix::from_fn(|r, c| rows[r][c]))
    }

    pub fn row(&self, r: usize) -> Vector<D> {
        Vector::new(std::array::from_fn(|c| self.0[(r, c)]))
    }

    /// Check `M·Mᵀ ≈ I` within `tolerance`.
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let product = self.0 * self.0.transpose();
        (0..D).all(|i| {
            (0..D).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (product[(i, j)] - expected).abs() < tolerance
            })
        })
    }

    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl Direction<3> {
    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::Mul for Direction<D> {
    type Output = Self;

    fn mul(self, other: Self) -> Self::Output {
        Self(self.0 * other.0)
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}
