//! Debug overlay renderer: classifies every pixel of the frame for the
//! scene inspector.

use ember_core::Scene;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use std::sync::Mutex;

/// What the overlay visualizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// Color each pixel by the id of the primitive it hits.
    #[default]
    Primitives,
    /// Color each pixel by the first hierarchy leaf its ray enters.
    BoundingVolumes,
    /// Shade each pixel by how many hierarchy nodes its ray visits.
    HeatMap,
}

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

const COLOR_ROTATION: [[u8; 4]; 7] = [
    [255, 0, 0, 255],     // red
    [0, 128, 0, 255],     // green
    [0, 0, 255, 255],     // blue
    [255, 255, 0, 255],   // yellow
    [255, 0, 255, 255],   // magenta
    [0, 255, 255, 255],   // cyan
    [169, 169, 169, 255], // dark gray
];

fn color_for(id: usize) -> [u8; 4] {
    COLOR_ROTATION[id % COLOR_ROTATION.len()]
}

fn heat_color(count: usize) -> [u8; 4] {
    let heat = (count * 16).min(255) as u8;
    [heat, 0, 255 - heat, 255]
}

/// Renders classification overlays over a prepared scene.
///
/// Mode changes may arrive from any thread; they land in a pending slot
/// and are latched once at the start of each render pass, so a mid-render
/// change can never tear the output.
pub struct DebugRaycaster {
    pending: Mutex<DebugMode>,
}

impl DebugRaycaster {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(DebugMode::default()),
        }
    }

    /// Select what the next overlay render shows.
    pub fn set_mode(&self, mode: DebugMode) {
        *self.pending.lock().expect("poisoned debug mode") = mode;
    }

    pub fn mode(&self) -> DebugMode {
        *self.pending.lock().expect("poisoned debug mode")
    }

    /// Render the overlay for the whole frame. The scene must be prepared.
    pub fn render(&self, scene: &Scene) -> RgbaImage {
        let mode = self.mode();
        let width = scene.width;
        let height = scene.height;

        let rows: Vec<Vec<[u8; 4]>> = (0..height)
            .into_par_iter()
            .map(|y| {
                (0..width)
                    .map(|x| Self::classify(scene, mode, x, y))
                    .collect()
            })
            .collect();

        let mut image = RgbaImage::new(width, height);
        for (y, row) in rows.into_iter().enumerate() {
            for (x, pixel) in row.into_iter().enumerate() {
                image.put_pixel(x as u32, y as u32, Rgba(pixel));
            }
        }
        image
    }

    fn classify(scene: &Scene, mode: DebugMode, x: u32, y: u32) -> [u8; 4] {
        let ray = scene.camera().ray_at(x as f32, y as f32);
        match mode {
            DebugMode::Primitives => scene
                .ray_trace(&ray, None)
                .map(|hit| color_for(hit.primitive))
                .unwrap_or(TRANSPARENT),
            DebugMode::BoundingVolumes => scene
                .accelerator()
                .and_then(|accelerator| {
                    accelerator
                        .intersect_leaves(&ray)
                        .first()
                        .map(|leaf| color_for(leaf.id))
                })
                .unwrap_or(TRANSPARENT),
            DebugMode::HeatMap => {
                let count = scene
                    .accelerator()
                    .map_or(0, |accelerator| accelerator.intersection_count(&ray));
                heat_color(count)
            }
        }
    }
}

impl Default for DebugRaycaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{Camera, Color, Material, Primitive, Shape};
    use ember_math::Vec3;

    fn prepared_scene() -> Scene {
        let mut scene = Scene::new(32, 24);
        scene.add_primitive(Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -4.0), 1.5),
            Material::diffuse(Color::splat(0.5)),
        ));
        scene.add_camera(Camera::new());
        scene.prepare();
        scene
    }

    #[test]
    fn test_primitive_overlay() {
        let scene = prepared_scene();
        let raycaster = DebugRaycaster::new();

        let overlay = raycaster.render(&scene);
        assert_eq!(overlay.dimensions(), (32, 24));

        // The sphere covers the image center; corners stay transparent
        assert_eq!(overlay.get_pixel(16, 12).0, color_for(0));
        assert_eq!(overlay.get_pixel(0, 0).0, TRANSPARENT);
    }

    #[test]
    fn test_mode_latched_per_pass() {
        let scene = prepared_scene();
        let raycaster = DebugRaycaster::new();

        raycaster.set_mode(DebugMode::HeatMap);
        assert_eq!(raycaster.mode(), DebugMode::HeatMap);

        let overlay = raycaster.render(&scene);
        // Heat map paints every pixel opaque
        assert!(overlay.pixels().all(|pixel| pixel.0[3] == 255));
    }

    #[test]
    fn test_bounding_volume_overlay() {
        let scene = prepared_scene();
        let raycaster = DebugRaycaster::new();
        raycaster.set_mode(DebugMode::BoundingVolumes);

        let overlay = raycaster.render(&scene);
        // The center ray passes through the single leaf's box
        assert_eq!(overlay.get_pixel(16, 12).0, color_for(0));
    }
}
