//! Scene description and closest-hit queries.

use std::time::Instant;

use ember_math::{Interval, Ray};
use log::info;

use crate::accel::Bvh;
use crate::{Camera, Color, Hit, Primitive, NEAR_ENOUGH};

/// A complete scene: primitives, cameras and global render parameters.
///
/// The hierarchy is built lazily by [`Scene::prepare`] and discarded
/// wholesale whenever the primitive list changes; during a render pass the
/// whole scene is treated as read-only.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Output resolution in pixels.
    pub width: u32,
    pub height: u32,

    /// Color shown where no sample ever hit geometry.
    pub background: Color,
    pub background_alpha: f32,

    /// Color returned by rays that leave the scene after at least one
    /// bounce.
    pub ambient: Color,

    /// Maximum number of bounces per path.
    pub recursion: u32,

    /// Refractive index of the empty space between primitives.
    pub air_refractive_index: f32,

    primitives: Vec<Primitive>,
    cameras: Vec<Camera>,
    current_camera: usize,
    accelerator: Option<Bvh>,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: Color::ZERO,
            background_alpha: 0.0,
            ambient: Color::ZERO,
            recursion: 3,
            air_refractive_index: 1.000293,
            primitives: Vec::new(),
            cameras: Vec::new(),
            current_camera: 0,
            accelerator: None,
        }
    }

    /// Add a primitive, invalidating any existing hierarchy.
    pub fn add_primitive(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
        self.invalidate_accelerator();
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn primitive(&self, id: usize) -> &Primitive {
        &self.primitives[id]
    }

    pub fn add_camera(&mut self, camera: Camera) {
        self.cameras.push(camera);
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    /// The currently selected camera.
    ///
    /// Panics if the scene has no cameras; the renderer validates this
    /// before starting.
    pub fn camera(&self) -> &Camera {
        &self.cameras[self.current_camera]
    }

    /// Cycle to the next camera. Returns true when the selection wrapped
    /// back to the first one.
    pub fn next_camera(&mut self) -> bool {
        self.current_camera += 1;
        if self.current_camera >= self.cameras.len() {
            self.current_camera = 0;
            return true;
        }
        false
    }

    /// Drop the hierarchy; the next `prepare` rebuilds it from scratch.
    pub fn invalidate_accelerator(&mut self) {
        self.accelerator = None;
    }

    pub fn is_prepared(&self) -> bool {
        self.accelerator.is_some()
    }

    /// Build the hierarchy (if missing) and initialize the cameras for the
    /// current resolution. Must run before `ray_trace`.
    pub fn prepare(&mut self) {
        if self.accelerator.is_none() {
            let started = Instant::now();
            self.accelerator = Some(Bvh::build(&self.primitives));
            info!(
                "built hierarchy over {} primitives in {:.2?}",
                self.primitives.len(),
                started.elapsed()
            );
        }

        let (width, height) = (self.width, self.height);
        for camera in &mut self.cameras {
            camera.initialize(width, height);
        }
    }

    pub fn accelerator(&self) -> Option<&Bvh> {
        self.accelerator.as_ref()
    }

    /// Closest hit along the ray, skipping the given previous surface
    /// event.
    ///
    /// Walks the hierarchy's candidates in near order and stops as soon as
    /// the best confirmed hit is closer than the next candidate's entry
    /// distance.
    pub fn ray_trace(&self, ray: &Ray, skip: Option<&Hit>) -> Option<Hit> {
        debug_assert!(
            self.accelerator.is_some(),
            "scene must be prepared before tracing"
        );
        let accelerator = self
            .accelerator
            .as_ref()
            .expect("scene must be prepared before tracing");

        let mut best: Option<Hit> = None;
        for candidate in accelerator.intersect_leaves(ray) {
            if let Some(hit) = &best {
                if candidate.near > hit.distance {
                    break;
                }
            }

            let limit = best.as_ref().map_or(f32::INFINITY, |hit| hit.distance);
            let range = Interval::new(-NEAR_ENOUGH, limit);
            if let Some(hit) = self.primitives[candidate.id].intersect(candidate.id, ray, range, skip)
            {
                best = Some(hit);
            }
        }

        best
    }
}
