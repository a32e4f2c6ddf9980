//! Physical-space geometry of a volume.

use crate::error::{LociError, Result};
use crate::spatial::{Direction, Point, Spacing, Vector};

/// Tolerance used when checking that a direction matrix is orthonormal.
///
/// Headers store the frame in single precision, so exact orthonormality is
/// not expected.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Origin, spacing and direction of a volume.
///
/// Maps continuous voxel indices `(x, y, z)` to physical coordinates:
/// `point = origin + direction · (index ⊙ spacing)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetadata<const D: usize> {
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<const D: usize> ImageMetadata<D> {
    pub fn new(origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            origin,
            spacing,
            direction,
        }
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    pub fn set_origin(&mut self, origin: Point<D>) {
        self.origin = origin;
    }

    pub fn set_direction(&mut self, direction: Direction<D>) {
        self.direction = direction;
    }

    /// Check spacing is strictly positive and direction orthonormal.
    pub fn validate(&self) -> Result<()> {
        if !self.spacing.is_valid() {
            return Err(LociError::computation(format!(
                "spacing must be strictly positive, got {:?}",
                self.spacing.to_array()
            )));
        }
        if !self.direction.is_orthonormal(ORTHONORMAL_TOLERANCE) {
            return Err(LociError::computation(format!(
                "direction matrix is not orthonormal: {:?}",
                self.direction.inner()
            )));
        }
        Ok(())
    }

    /// `point = origin + direction · (index ⊙ spacing)`
    pub fn index_to_physical(&self, index: &Point<D>) -> Point<D> {
        self.origin + self.direction * index.coords().component_mul(&self.spacing)
    }

    /// Physical displacement spanned by a displacement in index space.
    pub fn index_vector_to_physical(&self, index: &Vector<D>) -> Vector<D> {
        self.direction * index.component_mul(&self.spacing)
    }

    /// `index = direction⁻¹ · (point − origin) ⊘ spacing`
    pub fn physical_to_index(&self, point: &Point<D>) -> Result<Point<D>> {
        let inverse = self.direction.try_inverse().ok_or_else(|| {
            LociError::computation("direction matrix is singular")
        })?;
        let rotated = inverse * (*point - self.origin);
        Ok(Point::from(rotated.component_div(&self.spacing)))
    }
}

impl<const D: usize> Default for ImageMetadata<D> {
    fn default() -> Self {
        Self {
            origin: Point::origin(),
            spacing: Spacing::uniform(1.0),
            direction: Direction::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Point3 = Point<3>;
    type Spacing3 = Spacing<3>;
    type Direction3 = Direction<3>;
    type Vector3 = Vector<3>;

    fn swapped_axes() -> Direction3 {
        Direction3::from_rows([
            Vector3::new([0.0, 1.0, 0.0]),
            Vector3::new([1.0, 0.0, 0.0]),
            Vector3::new([0.0, 0.0, -1.0]),
        ])
    }

    #[test]
    fn test_index_physical_roundtrip() {
        let metadata = ImageMetadata::new(
            Point3::new([10.0, -20.0, 5.0]),
            Spacing3::new([2.0, 3.0, 4.0]),
            swapped_axes(),
        );
        let index = Point3::new([1.5, 2.0, -3.0]);
        let physical = metadata.index_to_physical(&index);
        // direction · (3, 6, -12) = (6, 3, 12)
        assert!((physical[0] - 16.0).abs() < 1e-12);
        assert!((physical[1] - -17.0).abs() < 1e-12);
        assert!((physical[2] - 17.0).abs() < 1e-12);

        let recovered = metadata.physical_to_index(&physical).unwrap();
        for i in 0..3 {
            assert!((recovered[i] - index[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut metadata = ImageMetadata::<3>::default();
        assert!(metadata.validate().is_ok());

        metadata = ImageMetadata::new(Point3::origin(), Spacing3::new([1.0, 0.0, 1.0]), Direction3::identity());
        assert!(matches!(metadata.validate(), Err(LociError::Computation(_))));

        let skewed = Direction3::from_rows([
            Vector3::new([1.0, 0.2, 0.0]),
            Vector3::new([0.0, 1.0, 0.0]),
            Vector3::new([0.0, 0.0, 1.0]),
        ]);
        metadata = ImageMetadata::new(Point3::origin(), Spacing3::uniform(1.0), skewed);
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_setters_keep_spacing() {
        let mut metadata = ImageMetadata::new(Point3::origin(), Spacing3::uniform(2.0), Direction3::identity());
        metadata.set_origin(Point3::new([1.0, 2.0, 3.0]));
        metadata.set_direction(swapped_axes());
        assert_eq!(metadata.spacing(), &Spacing3::uniform(2.0));
        assert_eq!(metadata.origin(), &Point3::new([1.0, 2.0, 3.0]));
    }
}
