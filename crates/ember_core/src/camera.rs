//! Camera for primary-ray generation.

use ember_math::{Ray, Vec3};
use rand::Rng;
use std::f32::consts::TAU;

/// Frustum camera generating rays into the scene.
///
/// `initialize` must run (normally via `Scene::prepare`) before any rays
/// are generated.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub look_from: Vec3,
    pub look_at: Vec3,
    pub vup: Vec3,

    /// Vertical field of view in degrees
    pub vfov: f32,
    /// Variation angle of rays through each pixel, in degrees; zero
    /// disables depth of field
    pub defocus_angle: f32,
    /// Distance from camera to the plane of perfect focus
    pub focus_dist: f32,

    // Cached computed values (set by initialize())
    pixel00_loc: Vec3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
    defocus_disk_u: Vec3,
    defocus_disk_v: Vec3,
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self {
            look_from: Vec3::ZERO,
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::new(0.0, 1.0, 0.0),
            vfov: 90.0,
            defocus_angle: 0.0,
            focus_dist: 1.0,
            pixel00_loc: Vec3::ZERO,
            pixel_delta_u: Vec3::ZERO,
            pixel_delta_v: Vec3::ZERO,
            defocus_disk_u: Vec3::ZERO,
            defocus_disk_v: Vec3::ZERO,
        }
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self
    }

    /// Set lens settings.
    pub fn with_lens(mut self, vfov: f32, defocus_angle: f32, focus_dist: f32) -> Self {
        self.vfov = vfov;
        self.defocus_angle = defocus_angle;
        self.focus_dist = focus_dist;
        self
    }

    /// Compute the cached viewport values for the given output resolution.
    pub fn initialize(&mut self, width: u32, height: u32) {
        let center = self.look_from;

        // Viewport dimensions at the focus distance
        let theta = self.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h * self.focus_dist;
        let viewport_width = viewport_height * (width as f32 / height as f32);

        // Camera basis vectors
        let w = (self.look_from - self.look_at).normalize();
        let u = self.vup.cross(w).normalize();
        let v = w.cross(u);

        // Viewport edges; v points down in image space
        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;

        self.pixel_delta_u = viewport_u / width as f32;
        self.pixel_delta_v = viewport_v / height as f32;

        let viewport_upper_left =
            center - self.focus_dist * w - viewport_u / 2.0 - viewport_v / 2.0;
        self.pixel00_loc = viewport_upper_left + 0.5 * (self.pixel_delta_u + self.pixel_delta_v);

        let defocus_radius = self.focus_dist * (self.defocus_angle / 2.0).to_radians().tan();
        self.defocus_disk_u = u * defocus_radius;
        self.defocus_disk_v = v * defocus_radius;
    }

    /// Deterministic ray through fractional pixel coordinates (no jitter,
    /// no depth of field). Used by the debug overlay.
    pub fn ray_at(&self, x: f32, y: f32) -> Ray {
        let pixel = self.pixel00_loc + x * self.pixel_delta_u + y * self.pixel_delta_v;
        Ray::directional(self.look_from, pixel - self.look_from)
    }

    /// Jittered sample ray through pixel (x, y), with defocus when the
    /// aperture is open.
    pub fn sample_ray(&self, x: u32, y: u32, rng: &mut impl Rng) -> Ray {
        let px = x as f32 + rng.gen::<f32>() - 0.5;
        let py = y as f32 + rng.gen::<f32>() - 0.5;
        let pixel = self.pixel00_loc + px * self.pixel_delta_u + py * self.pixel_delta_v;

        let origin = if self.defocus_angle <= 0.0 {
            self.look_from
        } else {
            self.defocus_disk_sample(rng)
        };

        Ray::directional(origin, pixel - origin)
    }

    fn defocus_disk_sample(&self, rng: &mut impl Rng) -> Vec3 {
        let r = rng.gen::<f32>().sqrt();
        let angle = rng.gen::<f32>() * TAU;
        self.look_from + r * angle.cos() * self.defocus_disk_u + r * angle.sin() * self.defocus_disk_v
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_center_ray_points_at_target() {
        let mut camera = Camera::new().with_position(
            Vec3::new(0.0, 1.0, 5.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::Y,
        );
        camera.initialize(101, 101);

        let ray = camera.ray_at(50.0, 50.0);
        let expected = (camera.look_at - camera.look_from).normalize();
        assert!((ray.direction - expected).length() < 1e-4);
        assert_eq!(ray.origin, camera.look_from);
    }

    #[test]
    fn test_sample_ray_stays_near_pixel() {
        let mut camera = Camera::new();
        camera.initialize(64, 64);
        let mut rng = StdRng::seed_from_u64(7);

        let reference = camera.ray_at(10.0, 20.0);
        for _ in 0..32 {
            let ray = camera.sample_ray(10, 20, &mut rng);
            // Jitter must stay within one pixel of the reference direction
            let max_step = camera.pixel_delta_u.length() + camera.pixel_delta_v.length();
            assert!((ray.direction - reference.direction).length() < max_step * 2.0);
        }
    }

    #[test]
    fn test_defocus_spreads_origins() {
        let mut camera = Camera::new().with_lens(90.0, 2.0, 5.0);
        camera.initialize(64, 64);
        let mut rng = StdRng::seed_from_u64(7);

        let mut any_offset = false;
        for _ in 0..16 {
            let ray = camera.sample_ray(32, 32, &mut rng);
            if (ray.origin - camera.look_from).length() > 1e-6 {
                any_offset = true;
            }
        }
        assert!(any_offset);
    }
}
