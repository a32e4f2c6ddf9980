//! Volume type: voxel data plus physical-space geometry.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{LociError, Result};
use crate::image::metadata::ImageMetadata;
use crate::spatial::{Direction, Point, Spacing};

/// Scalar volume with physical metadata.
///
/// The tensor is laid out with the slowest axis first (`[Z, Y, X]` for 3-D),
/// while origin, spacing, direction and indices are ordered `(x, y, z)`.
///
/// # Examples
/// ```rust
/// use loci_core::Image;
/// use loci_core::spatial::{Direction3, Point3, Spacing3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(2.0), Direction3::identity());
/// assert_eq!(image.shape(), [4, 5, 6]);
/// assert_eq!(image.size(), [6, 5, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    pub fn from_metadata(data: Tensor<B, D>, metadata: &ImageMetadata<D>) -> Self {
        Self::new(data, *metadata.origin(), *metadata.spacing(), *metadata.direction())
    }

    /// Build a volume from voxel values in tensor order (x fastest).
    pub fn from_values(
        values: Vec<f32>,
        shape: [usize; D],
        metadata: &ImageMetadata<D>,
        device: &B::Device,
    ) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(LociError::shape_mismatch(&[expected], &[values.len()]));
        }
        let data = Tensor::<B, D>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Ok(Self::from_metadata(data, metadata))
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
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

    pub fn metadata(&self) -> ImageMetadata<D> {
        ImageMetadata::new(self.origin, self.spacing, self.direction)
    }

    /// Replace origin and direction; voxel data and spacing are untouched.
    pub fn set_frame(&mut self, origin: Point<D>, direction: Direction<D>) {
        self.origin = origin;
        self.direction = direction;
    }

    /// New volume on the same grid with different voxel data.
    pub fn with_data(&self, data: Tensor<B, D>) -> Self {
        Self::new(data, self.origin, self.spacing, self.direction)
    }

    /// Tensor shape, slowest axis first.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Voxel count per index axis in `(x, y, z)` order.
    pub fn size(&self) -> [usize; D] {
        let shape = self.shape();
        std::array::from_fn(|i| shape[D - 1 - i])
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// True when both volumes share shape and geometry.
    pub fn same_grid(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.metadata() == other.metadata()
    }

    /// Copy voxel values to host memory in tensor order.
    pub fn to_values(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| LociError::computation(format!("failed to read voxel data: {:?}", e)))
    }

    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        self.metadata().index_to_physical(index)
    }

    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Result<Point<D>> {
        self.metadata().physical_to_index(point)
    }

    /// Batch map physical points `[N, D]` to continuous indices `[N, D]`.
    ///
    /// `I = (P − O) · T` with `T[r, c] = (D⁻¹)[c, r] / S[c]`.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let device = points.device();
        let inverse = self
            .direction
            .try_inverse()
            .ok_or_else(|| LociError::computation("direction matrix is singular"))?;

        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((inverse[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t_tensor = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        Ok((points - self.origin_tensor(&device)).matmul(t_tensor))
    }

    /// Batch map continuous indices `[N, D]` to physical points `[N, D]`.
    ///
    /// `P = O + I · M` with `M[r, c] = S[r] · D[c, r]`.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m_tensor = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

        indices.matmul(m_tensor) + self.origin_tensor(&device)
    }

    fn origin_tensor(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D])
    }
}
