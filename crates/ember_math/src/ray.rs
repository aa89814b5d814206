use crate::Vec3;

/// A ray in 3D space with an origin and a unit-length direction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray. The direction is expected to already be unit length.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        debug_assert!(
            (direction.length_squared() - 1.0).abs() < 1e-2,
            "ray direction must be (close to) unit length, got {direction:?}"
        );
        Self { origin, direction }
    }

    /// Create a new ray, normalizing the direction.
    pub fn directional(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(1.0), Vec3::X);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_directional_normalizes() {
        let ray = Ray::directional(Vec3::ZERO, Vec3::new(0.0, 3.0, 0.0));
        assert!((ray.direction.length() - 1.0).abs() < 1e-6);
        assert_eq!(ray.direction, Vec3::Y);
    }
}
