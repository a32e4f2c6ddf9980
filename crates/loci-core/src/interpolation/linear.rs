//! Trilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use super::trait_::Interpolator;

/// Trilinear interpolator.
///
/// A sample is inside the volume when every continuous index lies in
/// `[-0.5, size - 0.5)`; neighbours beyond the last voxel are clamped to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }

    fn inside<B: Backend>(coord: &Tensor<B, 1>, len: usize) -> Tensor<B, 1> {
        let lower = coord.clone().greater_equal_elem(-0.5).float();
        let upper = coord.clone().lower_elem(len as f32 - 0.5).float();
        lower * upper
    }

    fn gather<B: Backend>(
        flat: &Tensor<B, 1>,
        xi: &Tensor<B, 1, Int>,
        yi: &Tensor<B, 1, Int>,
        zi: &Tensor<B, 1, Int>,
        stride_y: i32,
        stride_z: i32,
    ) -> Tensor<B, 1> {
        let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
        flat.clone().gather(0, idx)
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>, default_value: f32) -> Tensor<B, 1> {
        let [d, h, w] = data.dims();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let inside = Self::inside(&x, w) * Self::inside(&y, h) * Self::inside(&z, d);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        // Weights are taken from the clamped base so edge samples reuse the edge voxel.
        let x0c = x0.clone().clamp(0.0, (w - 1) as f32);
        let y0c = y0.clone().clamp(0.0, (h - 1) as f32);
        let z0c = z0.clone().clamp(0.0, (d - 1) as f32);
        let wx = (x - x0c.clone()).clamp(0.0, 1.0);
        let wy = (y - y0c.clone()).clamp(0.0, 1.0);
        let wz = (z - z0c.clone()).clamp(0.0, 1.0);

        let x1_i = (x0c.clone() + 1.0).clamp(0.0, (w - 1) as f32).int();
        let y1_i = (y0c.clone() + 1.0).clamp(0.0, (h - 1) as f32).int();
        let z1_i = (z0c.clone() + 1.0).clamp(0.0, (d - 1) as f32).int();
        let x0_i = x0c.int();
        let y0_i = y0c.int();
        let z0_i = z0c.int();

        let stride_z = (h * w) as i32;
        let stride_y = w as i32;
        let flat = data.clone().reshape([d * h * w]);

        let v000 = Self::gather(&flat, &x0_i, &y0_i, &z0_i, stride_y, stride_z);
        let v001 = Self::gather(&flat, &x0_i, &y0_i, &z1_i, stride_y, stride_z);
        let v010 = Self::gather(&flat, &x0_i, &y1_i, &z0_i, stride_y, stride_z);
        let v011 = Self::gather(&flat, &x0_i, &y1_i, &z1_i, stride_y, stride_z);
        let v100 = Self::gather(&flat, &x1_i, &y0_i, &z0_i, stride_y, stride_z);
        let v101 = Self::gather(&flat, &x1_i, &y0_i, &z1_i, stride_y, stride_z);
        let v110 = Self::gather(&flat, &x1_i, &y1_i, &z0_i, stride_y, stride_z);
        let v111 = Self::gather(&flat, &x1_i, &y1_i, &z1_i, stride_y, stride_z);

        let one_minus_wx = wx.clone().neg() + 1.0;
        let one_minus_wy = wy.clone().neg() + 1.0;
        let one_minus_wz = wz.clone().neg() + 1.0;

        let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
        let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
        let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
        let c11 = v011 * one_minus_wx + v111 * wx;

        let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
        let c1 = c01 * one_minus_wy + c11 * wy;

        let sampled = c0 * one_minus_wz + c1 * wz;
        let outside = inside.clone().neg() + 1.0;
        sampled * inside + outside * default_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn ramp(device: &<Backend as burn::tensor::backend::Backend>::Device) -> Tensor<Backend, 3> {
        // value = x + 10 y + 100 z on a 3x3x3 grid
        let values: Vec<f32> = (0..27)
            .map(|i| {
                let (z, y, x) = (i / 9, (i / 3) % 3, i % 3);
                (x + 10 * y + 100 * z) as f32
            })
            .collect();
        Tensor::<Backend, 1>::from_floats(values.as_slice(), device).reshape([3, 3, 3])
    }

    #[test]
    fn test_grid_points_are_exact() {
        let device = Default::default();
        let data = ramp(&device);
        let indices = Tensor::<Backend, 2>::from_floats([[2.0, 1.0, 0.0], [0.0, 0.0, 2.0]], &device);
        let out = LinearInterpolator::new().interpolate(&data, indices, 0.0);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - 12.0).abs() < 1e-5);
        assert!((values[1] - 200.0).abs() < 1e-5);
    }

    #[test]
    fn test_linear_between_voxels() {
        let device = Default::default();
        let data = ramp(&device);
        let indices = Tensor::<Backend, 2>::from_floats([[0.5, 1.5, 0.25]], &device);
        let out = LinearInterpolator::new().interpolate(&data, indices, 0.0);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - (0.5 + 15.0 + 25.0)).abs() < 1e-4);
    }

    #[test]
    fn test_outside_uses_default_and_edge_is_clamped() {
        let device = Default::default();
        let data = ramp(&device);
        let indices = Tensor::<Backend, 2>::from_floats([[-0.6, 0.0, 0.0], [2.4, 0.0, 0.0], [3.0, 0.0, 0.0]], &device);
        let out = LinearInterpolator::new().interpolate(&data, indices, -1.0);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], -1.0);
        assert!((values[1] - 2.0).abs() < 1e-5);
        assert_eq!(values[2], -1.0);
    }
}
