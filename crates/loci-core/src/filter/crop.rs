//! Cropping to voxel sub-regions.

use burn::tensor::backend::Backend;
use crate::error::{LociError, Result};
use crate::image::Image;
use crate::spatial::Point;

/// Extracts a box of voxels; `start` and `size` are in `(x, y, z)` order.
///
/// The cropped volume keeps spacing and direction; its origin is the physical
/// position of `start` in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterestFilter {
    start: [usize; 3],
    size: [usize; 3],
}

impl RegionOfInterestFilter {
    pub fn new(start: [usize; 3], size: [usize; 3]) -> Self {
        Self { start, size }
    }

    pub fn start(&self) -> [usize; 3] {
        self.start
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Check the region lies inside a grid of `size` voxels.
    pub fn check_fits(&self, grid: [usize; 3]) -> Result<()> {
        let fits = (0..3).all(|i| self.size[i] > 0 && self.start[i] + self.size[i] <= grid[i]);
        if fits {
            Ok(())
        } else {
            Err(LociError::configuration(format!(
                "crop region start {:?} size {:?} exceeds grid {:?}",
                self.start, self.size, grid
            )))
        }
    }

    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        self.check_fits(image.size())?;
        let [sx, sy, sz] = self.start;
        let [nx, ny, nz] = self.size;
        let data = image
            .data()
            .clone()
            .slice([sz..sz + nz, sy..sy + ny, sx..sx + nx]);
        let origin = image.transform_continuous_index_to_physical_point(&Point::new([
            sx as f64, sy as f64, sz as f64,
        ]));
        Ok(Image::new(data, origin, *image.spacing(), *image.direction()))
    }
}

/// Crops to the bounding box of voxels strictly above `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForegroundCropFilter {
    threshold: f32,
}

impl ForegroundCropFilter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Bounding box `(start, size)` in `(x, y, z)` order, or `None` without foreground.
    pub fn bounding_box<B: Backend>(&self, image: &Image<B, 3>) -> Result<Option<([usize; 3], [usize; 3])>> {
        let values = image.to_values()?;
        let [nx, ny, _] = image.size();
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut found = false;
        for (i, v) in values.iter().enumerate() {
            if *v > self.threshold {
                let idx = [i % nx, (i / nx) % ny, i / (nx * ny)];
                for a in 0..3 {
                    lo[a] = lo[a].min(idx[a]);
                    hi[a] = hi[a].max(idx[a]);
                }
                found = true;
            }
        }
        if !found {
            return Ok(None);
        }
        let size = std::array::from_fn(|a| hi[a] - lo[a] + 1);
        Ok(Some((lo, size)))
    }

    /// Crop, or return the input unchanged when nothing exceeds the threshold.
    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        match self.bounding_box(image)? {
            Some((start, size)) => {
                tracing::debug!(?start, ?size, "foreground bounding box");
                RegionOfInterestFilter::new(start, size).apply(image)
            }
            None => {
                tracing::warn!(threshold = self.threshold, "no foreground voxels, skipping crop");
                Ok(image.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMetadata;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn image_with_blob() -> Image<Backend, 3> {
        let device = Default::default();
        // shape [Z=4, Y=5, X=6]; blob at x 2..=3, y 1..=3, z 2
        let mut values = vec![0.0f32; 4 * 5 * 6];
        for y in 1..=3 {
            for x in 2..=3 {
                values[2 * 30 + y * 6 + x] = 1.0;
            }
        }
        let metadata = ImageMetadata::new(Point3::new([10.0, 0.0, 0.0]), Spacing3::uniform(2.0), Direction3::identity());
        Image::from_values(values, [4, 5, 6], &metadata, &device).unwrap()
    }

    #[test]
    fn test_region_of_interest_origin_and_shape() {
        let image = image_with_blob();
        let cropped = RegionOfInterestFilter::new([1, 2, 3], [4, 3, 1]).apply(&image).unwrap();
        assert_eq!(cropped.size(), [4, 3, 1]);
        assert_eq!(cropped.origin(), &Point3::new([12.0, 4.0, 6.0]));
    }

    #[test]
    fn test_region_of_interest_out_of_bounds() {
        let image = image_with_blob();
        let result = RegionOfInterestFilter::new([3, 0, 0], [4, 1, 1]).apply(&image);
        assert!(matches!(result, Err(LociError::Configuration(_))));
    }

    #[test]
    fn test_foreground_bounding_box() {
        let image = image_with_blob();
        let bbox = ForegroundCropFilter::new(0.35).bounding_box(&image).unwrap();
        assert_eq!(bbox, Some(([2, 1, 2], [2, 3, 1])));

        let cropped = ForegroundCropFilter::new(0.35).apply(&image).unwrap();
        assert_eq!(cropped.size(), [2, 3, 1]);
        assert!(cropped.to_values().unwrap().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_foreground_missing_returns_input() {
        let image = image_with_blob();
        let out = ForegroundCropFilter::new(5.0).apply(&image).unwrap();
        assert!(out.same_grid(&image));
    }
}
