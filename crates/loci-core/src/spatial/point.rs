//! Physical-space and continuous-index points.

use nalgebra::Point as NaPoint;
use serde::{Deserialize, Serialize};
use super::Vector;

/// A location in physical space (mm) or a continuous voxel index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    pub fn new(coords: [f64; D]) -> Self {
        Self(NaPoint::from(coords))
    }

    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }

    /// Position vector of the point relative to the coordinate origin.
    pub fn coords(&self) -> Vector<D> {
        Vector(self.0.coords)
    }

    pub fn to_array(&self) -> [f64; D] {
        std::array::from_fn(|i| self.0.coords[i])
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        nalgebra::distance(&self.0, &other.0)
    }
}

impl<const D: usize> From<Vector<D>> for Point<D> {
    fn from(vector: Vector<D>) -> Self {
        Self(NaPoint::from(vector.0))
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0.coords[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Point<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0.coords[index]
    }
}

impl<const D: usize> std::ops::Sub for Point<D> {
    type Output = Vector<D>;

    fn sub(self, other: Self) -> Self::Output {
        Vector(self.0 - other.0)
    }
}

impl<const D: usize> std::ops::Add<Vector<D>> for Point<D> {
    type Output = Self;

    fn add(self, vector: Vector<D>) -> Self::Output {
        Self(self.0 + vector.0)
    }
}
