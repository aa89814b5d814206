//! A renderable primitive: a shape plus its surface material.

use crate::{hit::Hit, material::Material, shape::Shape};
use ember_math::{Bounded, Interval, Ray, Vec3};
use serde::{Deserialize, Serialize};

/// A shape paired with a material and per-primitive intersection flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub shape: Shape,
    pub material: Material,
    /// Whether hits on the back/inside face are kept. One-sided primitives
    /// discard inside crossings entirely.
    pub two_sided: bool,
    /// Flips the inside flag of every hit, turning a closed shape
    /// inside-out.
    pub invert: bool,
}

impl Primitive {
    pub fn new(shape: Shape, material: Material) -> Self {
        Self {
            shape,
            material,
            two_sided: true,
            invert: false,
        }
    }

    pub fn one_sided(mut self) -> Self {
        self.two_sided = false;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Find the closest acceptable hit on this primitive.
    ///
    /// `id` is the primitive's stable id recorded on the hit. `skip` is a
    /// previous surface event to ignore, so a bounced ray does not
    /// immediately re-intersect the surface it just left.
    pub fn intersect(
        &self,
        id: usize,
        ray: &Ray,
        range: Interval,
        skip: Option<&Hit>,
    ) -> Option<Hit> {
        for crossing in self.shape.intersect(ray).into_iter().flatten() {
            let mut hit = Hit {
                primitive: id,
                position: crossing.position,
                distance: crossing.distance,
                normal: crossing.normal,
                inside: crossing.inside,
            };

            if self.invert {
                hit.inside = !hit.inside;
            }
            if hit.inside && !self.two_sided {
                continue;
            }
            if !range.surrounds(hit.distance) {
                continue;
            }
            if let Some(skip) = skip {
                if hit.matches(ray, skip) {
                    continue;
                }
            }

            // Crossings arrive closest-first, so the first survivor wins
            return Some(hit);
        }

        None
    }
}

impl Bounded for Primitive {
    fn center(&self) -> Vec3 {
        self.shape.center()
    }

    fn max_center_distance(&self, direction: Vec3) -> f32 {
        self.shape.max_center_distance(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Color;
    use crate::NEAR_ENOUGH;

    fn sphere() -> Primitive {
        Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -3.0), 1.0),
            Material::diffuse(Color::splat(0.5)),
        )
    }

    fn forward_range() -> Interval {
        Interval::new(-NEAR_ENOUGH, f32::INFINITY)
    }

    #[test]
    fn test_closest_hit_first() {
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = sphere().intersect(0, &ray, forward_range(), None).unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-4);
        assert!(!hit.inside);
    }

    #[test]
    fn test_skip_hit_falls_through_to_exit() {
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let primitive = sphere();
        let entry = primitive.intersect(0, &ray, forward_range(), None).unwrap();

        // Re-tracing from just before the entry event must skip it and
        // land on the exit crossing instead.
        let hit = primitive
            .intersect(0, &ray, forward_range(), Some(&entry))
            .unwrap();
        assert!(hit.inside);
        assert!(hit.distance > entry.distance);
    }

    #[test]
    fn test_one_sided_discards_inside() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -3.0), -Vec3::Z);
        let primitive = sphere().one_sided();

        // From the center only the exit (inside) crossing exists, and a
        // one-sided primitive refuses it.
        assert!(primitive.intersect(0, &ray, forward_range(), None).is_none());
    }

    #[test]
    fn test_inverted_flips_inside() {
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = sphere()
            .inverted()
            .intersect(0, &ray, forward_range(), None)
            .unwrap();
        assert!(hit.inside);
    }

    #[test]
    fn test_range_limits_hits() {
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let primitive = sphere();
        assert!(primitive
            .intersect(0, &ray, Interval::new(-NEAR_ENOUGH, 1.5), None)
            .is_none());
    }
}
