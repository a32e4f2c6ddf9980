//! Displacement vectors in physical or index space.
//!
//! Differences of points, axis directions and landmark offsets are all
//! expressed as [`Vector`].

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// A D-dimensional displacement.
///
/// Thin wrapper around nalgebra's `SVector`; the inner vector is public so the
/// full nalgebra API stays reachable.
///
/// # Type Parameters
/// * `D` - The dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector<const D: usize>(pub SVector<f64, D>);

impl<const D: usize> Vector<D> {
    /// Create a new vector from components.
    ///
    /// # Arguments
    /// * `components` - Values in axis order (`x`, `y`, `z`)
    pub fn new(components: [f64; D]) -> Self {
        Self(SVector::from(components))
    }

    /// Create a zero vector.
    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.0.dot(&other.0)
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    /// Unit vector in the same direction.
    ///
    /// # Arguments
    /// * `epsilon` - Smallest norm that still counts as a direction
    ///
    /// Returns `None` when the norm is at or below `epsilon`.
    pub fn try_normalize(&self, epsilon: f64) -> Option<Self> {
        self.0.try_normalize(epsilon).map(Self)
    }

    /// Element-wise product.
    pub fn component_mul(&self, other: &Self) -> Self {
        Self(self.0.component_mul(&other.0))
    }

    /// Element-wise quotient.
    pub fn component_div(&self, other: &Self) -> Self {
        Self(self.0.component_div(&other.0))
    }

    /// Components as a plain array.
    pub fn to_array(&self) -> [f64; D] {
        std::array::from_fn(|i| self.0[i])
    }
}

impl Vector<3> {
    /// Right-handed cross product `self × other`.
    pub fn cross(&self, other: &Self) -> Self {
        Self(self.0.cross(&other.0))
    }
}

impl<const D: usize> std::ops::Index<usize> for Vector<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Vector<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Add for Vector<D> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl<const D: usize> std::ops::Sub for Vector<D> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self(self.0 - other.0)
    }
}

impl<const D: usize> std::ops::Mul<f64> for Vector<D> {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}

impl<const D: usize> std::ops::Neg for Vector<D> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}
