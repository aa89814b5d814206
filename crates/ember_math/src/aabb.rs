use crate::{Ray, Vec3};

/// Padding added around derived bounds so that surface points stay strictly
/// inside the box despite rounding.
const PAD: f32 = 1e-5;

/// Anything with a bounding extent: a center point plus the farthest reach
/// from that center along an arbitrary direction.
///
/// Passing the zero vector as the direction asks for the maximum distance
/// from the center to any point of the object (the bounding-sphere radius).
pub trait Bounded {
    fn center(&self) -> Vec3;
    fn max_center_distance(&self, direction: Vec3) -> f32;
}

/// Axis-Aligned Bounding Box.
///
/// Immutable; the center, volume and surface area are computed once at
/// construction since the hierarchy queries them repeatedly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    min: Vec3,
    max: Vec3,
    center: Vec3,
    volume: f32,
    surface_area: f32,
}

impl Aabb {
    /// Create a new AABB from its minimum and maximum corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        let size = max - min;
        Self {
            min,
            max,
            center: (min + max) / 2.0,
            volume: size.x * size.y * size.z,
            surface_area: 2.0 * (size.x * size.y + size.y * size.z + size.z * size.x),
        }
    }

    /// Create an AABB from two arbitrary corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self::new(a.min(b), a.max(b))
    }

    /// Derive the AABB of any bounded object by probing its extent along the
    /// six axis directions.
    pub fn from_bounded<B: Bounded + ?Sized>(bounded: &B) -> Self {
        let center = bounded.center();
        let min = center
            - Vec3::new(
                bounded.max_center_distance(-Vec3::X) + PAD,
                bounded.max_center_distance(-Vec3::Y) + PAD,
                bounded.max_center_distance(-Vec3::Z) + PAD,
            );
        let max = center
            + Vec3::new(
                bounded.max_center_distance(Vec3::X) + PAD,
                bounded.max_center_distance(Vec3::Y) + PAD,
                bounded.max_center_distance(Vec3::Z) + PAD,
            );
        Self::new(min, max)
    }

    /// The smallest AABB containing both inputs.
    pub fn combine(a: &Aabb, b: &Aabb) -> Self {
        Self::new(a.min.min(b.min), a.max.max(b.max))
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn surface_area(&self) -> f32 {
        self.surface_area
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// The eight corner points.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Slab test against a ray.
    ///
    /// Returns the (near, far) hit distances, or a NaN pair on a miss.
    /// Zero direction components produce infinite (or NaN) slab distances;
    /// the accumulation below is written so a NaN slab never overwrites the
    /// running bounds.
    pub fn intersect(&self, ray: &Ray) -> (f32, f32) {
        let mut near = f32::NEG_INFINITY;
        let mut far = f32::INFINITY;

        for axis in 0..3 {
            let inv = 1.0 / ray.direction[axis];
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }

            // Comparisons are false for NaN, keeping the previous bound.
            if t0 > near {
                near = t0;
            }
            if t1 < far {
                far = t1;
            }
        }

        // `!(far >= 0)` also catches a NaN far value.
        if near > far || !(far >= 0.0) {
            (f32::NAN, f32::NAN)
        } else {
            (near, far)
        }
    }
}

impl Bounded for Aabb {
    fn center(&self) -> Vec3 {
        self.center
    }

    fn max_center_distance(&self, direction: Vec3) -> f32 {
        let mut dist: f32 = 0.0;
        for corner in self.corners() {
            let offset = corner - self.center;
            let d = if direction == Vec3::ZERO {
                offset.length()
            } else {
                offset.dot(direction)
            };
            dist = dist.max(d);
        }
        dist
    }
}
