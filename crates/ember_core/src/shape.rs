//! Primitive shapes and their ray-intersection routines.
//!
//! A closed sum type keeps the hot intersection path monomorphic; dispatch
//! is a pattern match instead of a virtual call.

use crate::NEAR_ENOUGH;
use ember_math::{Aabb, Bounded, Ray, Vec3};
use serde::{Deserialize, Serialize};

/// A surface crossing produced by a shape, before primitive-level filtering.
#[derive(Debug, Clone, Copy)]
pub struct ShapeHit {
    pub position: Vec3,
    pub distance: f32,
    /// Normal facing against the incoming ray.
    pub normal: Vec3,
    /// Whether the ray was travelling inside the shape.
    pub inside: bool,
}

/// The concrete shapes the tracer understands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { center: Vec3, radius: f32 },
    /// Infinite plane through `point` with unit normal `normal`.
    Plane { point: Vec3, normal: Vec3 },
    Triangle { v0: Vec3, v1: Vec3, v2: Vec3 },
    /// Axis-aligned box.
    Cube { center: Vec3, size: Vec3 },
}

impl Shape {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Shape::Sphere { center, radius }
    }

    /// Create a plane; the normal is normalized here.
    pub fn plane(point: Vec3, normal: Vec3) -> Self {
        Shape::Plane {
            point,
            normal: normal.normalize(),
        }
    }

    pub fn triangle(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Shape::Triangle { v0, v1, v2 }
    }

    pub fn cube(center: Vec3, size: Vec3) -> Self {
        Shape::Cube { center, size }
    }

    /// Forward surface crossings along the ray, closest first.
    ///
    /// Closed shapes (sphere, cube) report the exit crossing as well, so a
    /// ray starting inside still produces a hit. Crossings behind the ray
    /// origin are dropped here.
    pub fn intersect(&self, ray: &Ray) -> [Option<ShapeHit>; 2] {
        match *self {
            Shape::Sphere { center, radius } => sphere_intersect(ray, center, radius),
            Shape::Plane { point, normal } => plane_intersect(ray, point, normal),
            Shape::Triangle { v0, v1, v2 } => triangle_intersect(ray, v0, v1, v2),
            Shape::Cube { center, size } => cube_intersect(ray, center, size),
        }
    }
}

fn sphere_hit(ray: &Ray, center: Vec3, radius: f32, distance: f32, inside: bool) -> ShapeHit {
    let position = ray.at(distance);
    let mut normal = (position - center) / radius;
    if inside {
        normal = -normal;
    }
    ShapeHit {
        position,
        distance,
        normal,
        inside,
    }
}

fn sphere_intersect(ray: &Ray, center: Vec3, radius: f32) -> [Option<ShapeHit>; 2] {
    let offset = ray.origin - center;
    let b = -2.0 * offset.dot(ray.direction);
    let c = offset.length_squared() - radius * radius;
    let radix = (b * b - 4.0 * c).sqrt();

    // NaN radix = negative discriminant, the ray missed entirely;
    // radix < -b means both crossings are behind the origin.
    if !(radix >= -b) {
        return [None, None];
    }

    let far = sphere_hit(ray, center, radius, (b + radix) / 2.0, true);

    // If the nearer crossing is ahead of the origin, report both
    if radix < b {
        let near = sphere_hit(ray, center, radius, (b - radix) / 2.0, false);
        return [Some(near), Some(far)];
    }

    // Origin is inside the sphere: only the exit crossing remains
    [Some(far), None]
}

fn plane_intersect(ray: &Ray, point: Vec3, normal: Vec3) -> [Option<ShapeHit>; 2] {
    let origin_dist = normal.dot(point);
    let ray_dist = normal.dot(ray.origin);
    let denom = normal.dot(ray.direction);

    // Ray running along the plane
    if denom.abs() < NEAR_ENOUGH && (origin_dist - ray_dist).abs() < NEAR_ENOUGH {
        return [
            Some(ShapeHit {
                position: ray.origin,
                distance: 0.0,
                normal,
                inside: true,
            }),
            None,
        ];
    }

    if denom == 0.0 {
        return [None, None];
    }

    let distance = (origin_dist - ray_dist) / denom;
    if distance < -NEAR_ENOUGH {
        return [None, None];
    }

    // Hitting the back face counts as an inside crossing
    let inside = denom > 0.0;
    [
        Some(ShapeHit {
            position: ray.at(distance),
            distance: distance.max(0.0),
            normal: if inside { -normal } else { normal },
            inside,
        }),
        None,
    ]
}

fn triangle_intersect(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> [Option<ShapeHit>; 2] {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let det = edge1.dot(h);

    // Ray parallel to the triangle plane
    if det.abs() < 1e-8 {
        return [None, None];
    }

    let inv = 1.0 / det;
    let s = ray.origin - v0;
    let u = inv * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return [None, None];
    }

    let q = s.cross(edge1);
    let v = inv * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return [None, None];
    }

    let distance = inv * edge2.dot(q);
    if distance < -NEAR_ENOUGH {
        return [None, None];
    }

    // A negative determinant is a back-face crossing
    let inside = det < 0.0;
    let face_normal = edge1.cross(edge2).normalize();
    [
        Some(ShapeHit {
            position: ray.at(distance),
            distance: distance.max(0.0),
            normal: if inside { -face_normal } else { face_normal },
            inside,
        }),
        None,
    ]
}

fn cube_axis_normal(axis: usize, direction: Vec3) -> Vec3 {
    let sign = -direction[axis].signum();
    match axis {
        0 => Vec3::new(sign, 0.0, 0.0),
        1 => Vec3::new(0.0, sign, 0.0),
        _ => Vec3::new(0.0, 0.0, sign),
    }
}

fn cube_intersect(ray: &Ray, center: Vec3, size: Vec3) -> [Option<ShapeHit>; 2] {
    let min = center - size / 2.0;
    let max = center + size / 2.0;

    let mut near = f32::NEG_INFINITY;
    let mut far = f32::INFINITY;
    let mut near_axis = 0;
    let mut far_axis = 0;

    for axis in 0..3 {
        let inv = 1.0 / ray.direction[axis];
        let mut t0 = (min[axis] - ray.origin[axis]) * inv;
        let mut t1 = (max[axis] - ray.origin[axis]) * inv;
        if inv < 0.0 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > near {
            near = t0;
            near_axis = axis;
        }
        if t1 < far {
            far = t1;
            far_axis = axis;
        }
    }

    if near > far || !(far >= 0.0) {
        return [None, None];
    }

    let far_hit = ShapeHit {
        position: ray.at(far),
        distance: far,
        normal: cube_axis_normal(far_axis, ray.direction),
        inside: true,
    };

    // Entry face behind the origin: the ray starts inside the box
    if !(near >= 0.0) {
        return [Some(far_hit), None];
    }

    let near_hit = ShapeHit {
        position: ray.at(near),
        distance: near,
        normal: cube_axis_normal(near_axis, ray.direction),
        inside: false,
    };
    [Some(near_hit), Some(far_hit)]
}

impl Bounded for Shape {
    fn center(&self) -> Vec3 {
        match *self {
            Shape::Sphere { center, .. } => center,
            Shape::Plane { point, .. } => point,
            Shape::Triangle { v0, v1, v2 } => (v0 + v1 + v2) / 3.0,
            Shape::Cube { center, .. } => center,
        }
    }

    fn max_center_distance(&self, direction: Vec3) -> f32 {
        match *self {
            Shape::Sphere { radius, .. } => radius,
            Shape::Plane { normal, .. } => {
                // Extent vanishes only when probing straight along the normal
                if normal.dot(direction).abs() >= 1.0 - 1e-6 {
                    0.0
                } else {
                    f32::INFINITY
                }
            }
            Shape::Triangle { v0, v1, v2 } => {
                let center = (v0 + v1 + v2) / 3.0;
                let mut dist: f32 = 0.0;
                for vertex in [v0, v1, v2] {
                    let offset = vertex - center;
                    let d = if direction == Vec3::ZERO {
                        offset.length()
                    } else {
                        offset.dot(direction)
                    };
                    dist = dist.max(d);
                }
                dist
            }
            Shape::Cube { center, size } => {
                Aabb::new(center - size / 2.0, center + size / 2.0).max_center_distance(direction)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_two_crossings() {
        let shape = Shape::sphere(Vec3::new(0.0, 0.0, -3.0), 1.0);
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);

        let [near, far] = shape.intersect(&ray);
        let near = near.unwrap();
        let far = far.unwrap();

        assert!((near.distance - 2.0).abs() < 1e-4);
        assert!(!near.inside);
        assert!((near.normal - Vec3::Z).length() < 1e-4);

        assert!((far.distance - 4.0).abs() < 1e-4);
        assert!(far.inside);
        // Exit normal points back against the ray
        assert!((far.normal - Vec3::Z).length() < 1e-4);
    }

    #[test]
    fn test_sphere_from_inside() {
        let shape = Shape::sphere(Vec3::ZERO, 1.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        let [first, second] = shape.intersect(&ray);
        let first = first.unwrap();
        assert!(second.is_none());
        assert!(first.inside);
        assert!((first.distance - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_sphere_behind() {
        let shape = Shape::sphere(Vec3::new(0.0, 0.0, 5.0), 1.0);
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let [a, b] = shape.intersect(&ray);
        assert!(a.is_none() && b.is_none());
    }

    #[test]
    fn test_plane_front_and_back() {
        let shape = Shape::plane(Vec3::ZERO, Vec3::Y);

        let from_above = Ray::new(Vec3::new(0.0, 2.0, 0.0), -Vec3::Y);
        let hit = shape.intersect(&from_above)[0].unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-4);
        assert!(!hit.inside);
        assert_eq!(hit.normal, Vec3::Y);

        let from_below = Ray::new(Vec3::new(0.0, -2.0, 0.0), Vec3::Y);
        let hit = shape.intersect(&from_below)[0].unwrap();
        assert!(hit.inside);
        assert_eq!(hit.normal, -Vec3::Y);
    }

    #[test]
    fn test_plane_parallel_miss() {
        let shape = Shape::plane(Vec3::ZERO, Vec3::Y);
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X);
        assert!(shape.intersect(&ray)[0].is_none());
    }

    #[test]
    fn test_triangle_hit() {
        let shape = Shape::triangle(
            Vec3::new(-1.0, -1.0, -2.0),
            Vec3::new(1.0, -1.0, -2.0),
            Vec3::new(0.0, 1.0, -2.0),
        );
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);

        let hit = shape.intersect(&ray)[0].unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-4);
        assert!(hit.normal.dot(ray.direction) < 0.0);
    }

    #[test]
    fn test_triangle_outside_miss() {
        let shape = Shape::triangle(
            Vec3::new(-1.0, -1.0, -2.0),
            Vec3::new(1.0, -1.0, -2.0),
            Vec3::new(0.0, 1.0, -2.0),
        );
        let ray = Ray::new(Vec3::new(5.0, 5.0, 0.0), -Vec3::Z);
        assert!(shape.intersect(&ray)[0].is_none());
    }

    #[test]
    fn test_cube_crossings() {
        let shape = Shape::cube(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(2.0));
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);

        let [near, far] = shape.intersect(&ray);
        let near = near.unwrap();
        let far = far.unwrap();
        assert!((near.distance - 4.0).abs() < 1e-4);
        assert!((far.distance - 6.0).abs() < 1e-4);
        assert_eq!(near.normal, Vec3::Z);
        assert_eq!(far.normal, Vec3::Z);
        assert!(!near.inside);
        assert!(far.inside);
    }

    #[test]
    fn test_bounded_extents() {
        let sphere = Shape::sphere(Vec3::ONE, 2.0);
        assert_eq!(Bounded::center(&sphere), Vec3::ONE);
        assert_eq!(sphere.max_center_distance(Vec3::X), 2.0);
        assert_eq!(sphere.max_center_distance(Vec3::ZERO), 2.0);

        let plane = Shape::plane(Vec3::ZERO, Vec3::Y);
        assert_eq!(plane.max_center_distance(Vec3::Y), 0.0);
        assert_eq!(plane.max_center_distance(-Vec3::Y), 0.0);
        assert_eq!(plane.max_center_distance(Vec3::X), f32::INFINITY);

        let cube = Shape::cube(Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(cube.max_center_distance(Vec3::X), 1.0);
        assert_eq!(cube.max_center_distance(Vec3::Y), 2.0);
        assert_eq!(cube.max_center_distance(-Vec3::Z), 3.0);
    }
}
