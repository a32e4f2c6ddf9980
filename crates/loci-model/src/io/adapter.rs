use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use loci_core::image::{Image, ImageMetadata};
use loci_core::{LociError, Result};

/// Convert a volume to a model input tensor `[1, 1, Z, Y, X]`.
pub fn image_to_tensor<B: Backend>(image: &Image<B, 3>) -> Tensor<B, 5> {
    let [d, h, w] = image.shape();
    image.data().clone().reshape([1, 1, d, h, w])
}

/// Convert a single-channel model output back into a volume with the given geometry.
///
/// The tensor must be `[1, 1, Z, Y, X]` with `[Z, Y, X] == shape`.
pub fn tensor_to_image<B: Backend>(
    tensor: Tensor<B, 5>,
    shape: [usize; 3],
    metadata: &ImageMetadata<3>,
) -> Result<Image<B, 3>> {
    let dims = tensor.dims();
    let expected = [1, 1, shape[0], shape[1], shape[2]];
    if dims != expected {
        return Err(LociError::shape_mismatch(&expected, &dims));
    }
    Ok(Image::from_metadata(tensor.reshape(shape), metadata))
}

/// Read a tensor's values in row-major order.
pub fn tensor_to_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| LociError::external(format!("failed to read model output: {:?}", e)))
}

/// Read a single-element tensor as a scalar.
pub fn tensor_to_scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<f64> {
    let values = tensor_to_values(tensor)?;
    match values.as_slice() {
        [value] => Ok(*value as f64),
        other => Err(LociError::shape_mismatch(&[1], &[other.len()])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_image_tensor_roundtrip() {
        let device = Default::default();
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let metadata = ImageMetadata::default();
        let image = Image::<Backend, 3>::from_values(values.clone(), [2, 3, 4], &metadata, &device).unwrap();

        let tensor = image_to_tensor(&image);
        assert_eq!(tensor.dims(), [1, 1, 2, 3, 4]);

        let back = tensor_to_image(tensor, [2, 3, 4], &metadata).unwrap();
        assert_eq!(back.to_values().unwrap(), values);
    }

    #[test]
    fn test_tensor_to_image_rejects_wrong_grid() {
        let device = Default::default();
        let tensor = Tensor::<Backend, 5>::zeros([1, 1, 2, 3, 4], &device);
        let result = tensor_to_image(tensor, [2, 3, 5], &ImageMetadata::default());
        assert!(matches!(result, Err(LociError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_scalar_extraction() {
        let device = Default::default();
        let tensor = Tensor::<Backend, 2>::from_floats([[0.75]], &device);
        assert!((tensor_to_scalar(tensor).unwrap() - 0.75).abs() < 1e-6);
        let tensor = Tensor::<Backend, 1>::from_floats([1.0, 2.0], &device);
        assert!(tensor_to_scalar(tensor).is_err());
    }
}
