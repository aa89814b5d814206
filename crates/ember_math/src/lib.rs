// Re-export glam for convenience
pub use glam::*;

// Ember math types
mod aabb;
mod basis;
mod interval;
mod ray;

pub use aabb::{Aabb, Bounded};
pub use basis::{cone_direction, perpendicular};
pub use interval::Interval;
pub use ray::Ray;
