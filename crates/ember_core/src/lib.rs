//! Ember Core - scene model and spatial acceleration.
//!
//! This crate provides:
//!
//! - **Scene types**: `Scene`, `Primitive`, `Shape`, `Material`, `Camera`
//! - **Acceleration**: the bounding-volume hierarchy and its supporting
//!   structures (`accel::Bvh`, `accel::KdTree`, `accel::Heap`)
//!
//! The renderer treats a prepared [`Scene`] as read-only: primitives,
//! cameras and the hierarchy never change during a render pass.

pub mod accel;
pub mod camera;
pub mod hit;
pub mod material;
pub mod primitive;
pub mod scene;
pub mod shape;

// Re-export commonly used types
pub use camera::Camera;
pub use hit::Hit;
pub use material::{luminance, Color, Material};
pub use primitive::Primitive;
pub use scene::Scene;
pub use shape::Shape;

/// Tolerance used for hit-position comparisons and near-zero denominators.
pub const NEAR_ENOUGH: f32 = 1e-4;
