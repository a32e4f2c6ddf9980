//! Volume types.

pub mod image;
pub mod metadata;

pub use image::Image;
pub use metadata::ImageMetadata;
