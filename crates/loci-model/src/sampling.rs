//! Dense trilinear sampling used by the warp layer.

use burn::tensor::{backend::Backend, Int, Tensor};

struct AxisCorners<B: Backend> {
    lower: Tensor<B, 5, Int>,
    upper: Tensor<B, 5, Int>,
    lower_weight: Tensor<B, 5>,
    upper_weight: Tensor<B, 5>,
}

/// Split a coordinate channel into its two integer neighbours and weights.
///
/// Neighbours outside `[0, len)` get weight zero, so samples falling off the
/// grid fade to zero instead of repeating the border.
fn axis_corners<B: Backend>(coord: Tensor<B, 5>, len: usize) -> AxisCorners<B> {
    let max = (len - 1) as f32;
    let lower = coord.clone().floor();
    let upper = lower.clone().add_scalar(1.0);

    let upper_weight = coord - lower.clone();
    let lower_weight = upper_weight.clone().neg().add_scalar(1.0);

    let in_range = |c: &Tensor<B, 5>| {
        c.clone()
            .greater_equal_elem(0.0)
            .float()
            .mul(c.clone().lower_equal_elem(max).float())
    };
    let lower_weight = lower_weight * in_range(&lower);
    let upper_weight = upper_weight * in_range(&upper);

    AxisCorners {
        lower: lower.clamp(0.0, max).int(),
        upper: upper.clamp(0.0, max).int(),
        lower_weight,
        upper_weight,
    }
}

/// Trilinear sampling of `image [N, C, D, H, W]` at `grid [N, 3, D, H, W]`,
/// where the grid holds voxel coordinates in `(z, y, x)` channel order.
pub fn trilinear_sample<B: Backend>(image: Tensor<B, 5>, grid: Tensor<B, 5>) -> Tensor<B, 5> {
    let [n, c, d, h, w] = image.dims();
    let channel = |i: usize| grid.clone().slice([0..n, i..i + 1, 0..d, 0..h, 0..w]);

    let z = axis_corners(channel(0), d);
    let y = axis_corners(channel(1), h);
    let x = axis_corners(channel(2), w);

    let flat = image.reshape([n, c, d * h * w]);
    let fetch = |index: Tensor<B, 5, Int>| {
        let index = index.reshape([n, 1, d * h * w]).repeat(&[1, c, 1]);
        flat.clone().gather(2, index).reshape([n, c, d, h, w])
    };

    let plane = (h * w) as i32;
    let row = w as i32;
    let mut out: Option<Tensor<B, 5>> = None;
    for (zi, zw) in [(&z.lower, &z.lower_weight), (&z.upper, &z.upper_weight)] {
        for (yi, yw) in [(&y.lower, &y.lower_weight), (&y.upper, &y.upper_weight)] {
            for (xi, xw) in [(&x.lower, &x.lower_weight), (&x.upper, &x.upper_weight)] {
                let index = zi.clone().mul_scalar(plane) + yi.clone().mul_scalar(row) + xi.clone();
                let weight = zw.clone() * yw.clone() * xw.clone();
                let term = fetch(index) * weight;
                out = Some(match out {
                    Some(acc) => acc + term,
                    None => term,
                });
            }
        }
    }
    // Eight corners are always visited.
    out.unwrap_or_else(|| Tensor::zeros([n, c, d, h, w], &grid.device()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn identity_grid(d: usize, h: usize, w: usize) -> Tensor<Backend, 5> {
        let device = Default::default();
        let z = Tensor::<Backend, 1, Int>::arange(0..d as i64, &device)
            .float()
            .reshape([1, 1, d, 1, 1])
            .repeat(&[1, 1, 1, h, w]);
        let y = Tensor::<Backend, 1, Int>::arange(0..h as i64, &device)
            .float()
            .reshape([1, 1, 1, h, 1])
            .repeat(&[1, 1, d, 1, w]);
        let x = Tensor::<Backend, 1, Int>::arange(0..w as i64, &device)
            .float()
            .reshape([1, 1, 1, 1, w])
            .repeat(&[1, 1, d, h, 1]);
        Tensor::cat(vec![z, y, x], 1)
    }

    #[test]
    fn test_identity_grid_reproduces_image() {
        let device = Default::default();
        let image = Tensor::<Backend, 5>::random(
            [1, 2, 3, 4, 5],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let out = trilinear_sample(image.clone(), identity_grid(3, 4, 5));
        let diff = (out - image).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }

    #[test]
    fn test_half_voxel_shift_along_x() {
        let device = Default::default();
        let image = Tensor::<Backend, 1, Int>::arange(0..4, &device)
            .float()
            .reshape([1, 1, 1, 1, 4]);
        let grid = identity_grid(1, 1, 4);
        let shift = Tensor::<Backend, 5>::from_floats([[[[[0.0, 0.0, 0.0, 0.0]]], [[[0.0, 0.0, 0.0, 0.0]]], [[[0.5, 0.5, 0.5, 0.5]]]]], &device);
        let out = trilinear_sample(image, grid + shift);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - 0.5).abs() < 1e-5);
        assert!((values[2] - 2.5).abs() < 1e-5);
        // Upper neighbour of the last voxel is off-grid.
        assert!((values[3] - 1.5).abs() < 1e-5);
    }
}
