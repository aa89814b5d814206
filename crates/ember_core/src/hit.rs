//! Record of a ray-primitive intersection.

use crate::NEAR_ENOUGH;
use ember_math::{Ray, Vec3};

/// A single surface event along a ray.
///
/// The normal always points against the incoming ray; `inside` records
/// whether the ray was travelling inside the primitive's medium when the
/// surface was crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Stable id of the primitive that was hit (its index in the scene).
    pub primitive: usize,
    /// World-space intersection point.
    pub position: Vec3,
    /// Distance along the ray.
    pub distance: f32,
    /// Surface normal at the intersection, facing the incoming ray.
    pub normal: Vec3,
    /// Whether the ray origin was inside the primitive.
    pub inside: bool,
}

impl Hit {
    /// Whether this hit is the same surface event as `other`.
    ///
    /// Used to skip the previous bounce's surface when re-tracing from a hit
    /// position, so a grazing ray cannot immediately re-intersect the
    /// coincident surface it just left.
    pub fn matches(&self, ray: &Ray, other: &Hit) -> bool {
        if self.primitive != other.primitive {
            return false;
        }
        if !self.position.abs_diff_eq(other.position, NEAR_ENOUGH) {
            return false;
        }

        // A ray leaving through a surface sees the flipped inside flag of
        // the event it came from.
        if ray.direction.dot(other.normal) > 0.0 {
            self.inside != other.inside
        } else {
            self.inside == other.inside
        }
    }
}
