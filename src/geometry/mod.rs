//! Geometry utilities: SE3 transforms and geographic coordinates.

pub mod coordinate;
pub mod se3;

pub use coordinate::{GeoCoordinate, PoseAlignment};
pub use se3::{SE3, translation_of};
