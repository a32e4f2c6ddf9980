//! Voxel spacing.

use super::Vector;

/// Physical distance between neighbouring voxels along each axis.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    /// All components strictly positive and finite.
    pub fn is_valid(&self) -> bool {
        (0..D).all(|i| self[i].is_finite() && self[i] > 0.0)
    }

    pub fn min_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Spacing3 = Spacing<3>;

    #[test]
    fn test_spacing_validity() {
        assert!(Spacing3::uniform(2.0).is_valid());
        assert!(!Spacing3::new([1.0, 0.0, 1.0]).is_valid());
        assert!(!Spacing3::new([1.0, -2.0, 1.0]).is_valid());
        assert_eq!(Spacing3::new([3.0, 1.5, 2.0]).min_spacing(), 1.5);
    }
}
