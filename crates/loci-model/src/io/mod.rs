pub mod adapter;

pub use adapter::{image_to_tensor, tensor_to_image, tensor_to_scalar, tensor_to_values};
