pub mod error;
pub mod image;
pub mod spatial;
pub mod interpolation;
pub mod filter;
pub mod statistics;

pub use error::{LociError, Result};
pub use image::{Image, ImageMetadata};
pub use spatial::{Direction, Point, Spacing, Vector};
