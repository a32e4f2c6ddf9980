//! Spatial types: points, vectors, spacing and direction matrices.
//!
//! All components are stored in physical axis order `(x, y, z)` and backed by
//! nalgebra fixed-size types.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::Direction;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;
