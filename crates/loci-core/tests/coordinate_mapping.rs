use loci_core::image::Image;
use loci_core::spatial::{Direction, Point, Spacing};
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use proptest::prelude::*;

type Backend = NdArray<f32>;
const D: usize = 3;

fn make_rotation(angle_x: f64, angle_y: f64, angle_z: f64) -> Direction<D> {
    let rotation = nalgebra::Rotation3::from_euler_angles(angle_x, angle_y, angle_z);
    Direction(rotation.into_inner())
}

proptest! {
    #[test]
    fn test_coordinate_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in 0.1f64..5.0, sz in 0.1f64..5.0,
        ax in -3.14f64..3.14, ay in -1.5f64..1.5, az in -3.14f64..3.14,
        px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0
    ) {
        let device = Default::default();
        let data = Tensor::<Backend, D>::zeros([2, 2, 2], &device);
        let image = Image::new(
            data,
            Point::<D>::new([ox, oy, oz]),
            Spacing::<D>::new([sx, sy, sz]),
            make_rotation(ax, ay, az),
        );
        let point = Point::<D>::new([px, py, pz]);

        let index = image.transform_physical_point_to_continuous_index(&point).unwrap();
        let recovered = image.transform_continuous_index_to_physical_point(&index);

        prop_assert!(point.distance(&recovered) < 1e-6, "{:?} vs {:?}", point, recovered);
    }

    #[test]
    fn test_tensor_batch_consistency(
        ox in -10.0f64..10.0,
        sx in 0.5f64..2.0,
        az in -3.0f64..3.0,
        px in -10.0f64..10.0
    ) {
        let device = Default::default();
        let data = Tensor::<Backend, D>::zeros([2, 2, 2], &device);
        let image = Image::new(
            data,
            Point::<D>::new([ox, -ox, 2.0 * ox]),
            Spacing::<D>::new([sx, 2.0 * sx, 1.0]),
            make_rotation(0.0, 0.0, az),
        );

        let point = Point::<D>::new([px, 0.5 * px, -px]);
        let index = image.transform_physical_point_to_continuous_index(&point).unwrap();

        let points_tensor = Tensor::<Backend, 2>::from_floats([[px as f32, (0.5 * px) as f32, -px as f32]], &device);
        let values = image.world_to_index_tensor(points_tensor).unwrap().into_data().to_vec::<f32>().unwrap();

        for i in 0..3 {
            prop_assert!((values[i] - index[i] as f32).abs() < 1e-3);
        }
    }
}
