//! The stochastic path-tracing integrator.
//!
//! One camera sample in, one color out. Each worker owns its own tracer
//! (and random generator); nothing here is shared between threads.

use std::f32::consts::{PI, TAU};

use ember_core::{luminance, Color, Hit, Scene};
use ember_math::{cone_direction, Ray, Vec3};
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// How a bounce was resolved. Recorded per bounce for the ray inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceKind {
    Diffuse,
    Specular,
    /// The specular sample pointed back into the surface; the path ended.
    SpecularFail,
    Transmitted,
    Emission,
    /// Every luminance was zero; nothing to sample.
    PureBlack,
    RecursionLimit,
    Missed,
}

/// One bounce of a debug trace.
#[derive(Debug, Clone, Copy)]
pub struct BounceRecord {
    pub hit: Option<Hit>,
    pub kind: BounceKind,
    /// Fresnel reflectance ratio, when this bounce computed one
    /// (1.0 marks total internal reflection).
    pub fresnel: Option<f32>,
}

enum Branch {
    Transmit,
    Specular,
    Diffuse,
    Emit,
}

/// Traces single camera samples through a prepared scene.
pub struct PathTracer {
    rng: SmallRng,
}

impl PathTracer {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Deterministic tracer for tests and reproducible debug sessions.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Trace one camera sample for pixel (x, y) of the scene's current
    /// camera. Returns `None` for an instant miss (the very first bounce
    /// left the scene), which accumulates as a miss rather than a color.
    pub fn trace_pixel(&mut self, scene: &Scene, x: u32, y: u32) -> Option<Color> {
        let ray = scene.camera().sample_ray(x, y, &mut self.rng);
        self.trace(scene, ray)
    }

    /// Trace one sample along an explicit ray.
    pub fn trace(&mut self, scene: &Scene, ray: Ray) -> Option<Color> {
        self.trace_impl(scene, ray, None)
    }

    /// Trace one sample, recording every bounce for inspection.
    pub fn debug_trace(&mut self, scene: &Scene, ray: Ray) -> Vec<BounceRecord> {
        let mut records = Vec::new();
        self.trace_impl(scene, ray, Some(&mut records));
        records
    }

    /// Full per-bounce records for one pixel sample.
    pub fn debug_trace_pixel(&mut self, scene: &Scene, x: u32, y: u32) -> Vec<BounceRecord> {
        let ray = scene.camera().sample_ray(x, y, &mut self.rng);
        self.debug_trace(scene, ray)
    }

    fn trace_impl(
        &mut self,
        scene: &Scene,
        mut ray: Ray,
        mut records: Option<&mut Vec<BounceRecord>>,
    ) -> Option<Color> {
        let mut record = |hit: Option<Hit>, kind: BounceKind, fresnel: Option<f32>| {
            if let Some(records) = records.as_deref_mut() {
                records.push(BounceRecord { hit, kind, fresnel });
            }
        };

        let mut prev_hit: Option<Hit> = None;
        let mut last_hit: Option<Hit> = None;
        let mut tint = Color::ONE;

        for depth in 0..=scene.recursion {
            // Periodically re-normalize the direction to stop compounding
            // error across bounces
            if depth % 3 == 0 {
                ray = Ray::directional(ray.origin, ray.direction);
            }

            let Some(hit) = scene.ray_trace(&ray, prev_hit.as_ref()) else {
                record(None, BounceKind::Missed, None);
                // An instant miss is reported as such; later misses pick up
                // the ambient color
                if depth == 0 {
                    return None;
                }
                return Some(scene.ambient);
            };
            last_hit = Some(hit);

            if depth >= scene.recursion {
                record(Some(hit), BounceKind::RecursionLimit, None);
                break;
            }

            let material = &scene.primitive(hit.primitive).material;
            let rough_normal = self.shininess_lobe(hit.normal, material.shininess);

            let diff_lum = luminance(material.diffuse);
            let mut spec_lum = luminance(material.specular);
            let mut refr_lum = luminance(material.refraction);
            let emis_lum = luminance(material.emission);

            let cos = -rough_normal.dot(ray.direction);
            let mut cos_out = 0.0;
            let mut ior_ratio = 0.0;
            let mut fresnel = None;

            // Split reflection against transmission on refractive surfaces
            if (refr_lum > 0.0 || spec_lum > 0.0)
                && material.refractive_index != 0.0
                && cos >= 0.0
            {
                let (ior_in, ior_out) = if hit.inside {
                    (material.refractive_index, scene.air_refractive_index)
                } else {
                    (scene.air_refractive_index, material.refractive_index)
                };
                ior_ratio = ior_in / ior_out;
                let sin_out = ior_ratio * (1.0 - cos * cos).max(0.0).sqrt();

                if sin_out >= 1.0 {
                    // Total internal reflection: the transmission branch
                    // collapses and specular keeps its full weight
                    refr_lum = 0.0;
                    fresnel = Some(1.0);
                } else {
                    cos_out = (1.0 - sin_out * sin_out).sqrt();
                    let s_wave = (ior_out * cos - ior_in * cos_out) / (ior_out * cos + ior_in * cos_out);
                    let p_wave = (ior_in * cos - ior_out * cos_out) / (ior_in * cos + ior_out * cos_out);
                    let ratio = (s_wave * s_wave + p_wave * p_wave) / 2.0;
                    spec_lum *= ratio;
                    refr_lum *= 1.0 - ratio;
                    fresnel = Some(ratio);
                }
            } else {
                refr_lum = 0.0;
            }

            let total_lum = diff_lum + spec_lum + refr_lum + emis_lum;
            if total_lum <= 0.0 {
                record(Some(hit), BounceKind::PureBlack, fresnel);
                break;
            }

            // Luminance-weighted categorical draw over the BSDF branches
            let branch = {
                let mut pick = self.rng.gen::<f32>() * total_lum;
                pick -= refr_lum;
                if refr_lum > 0.0 && pick <= 0.0 {
                    Branch::Transmit
                } else {
                    pick -= spec_lum;
                    if spec_lum > 0.0 && pick <= 0.0 {
                        Branch::Specular
                    } else {
                        pick -= diff_lum;
                        if diff_lum > 0.0 && pick <= 0.0 {
                            Branch::Diffuse
                        } else {
                            Branch::Emit
                        }
                    }
                }
            };

            let (out_dir, new_tint, kind) = match branch {
                Branch::Transmit => {
                    let dir = rough_normal * -cos_out + (ray.direction + rough_normal * cos) * ior_ratio;
                    // Tint only on entry; leaving the medium adds none
                    let color = if hit.inside {
                        Color::ONE
                    } else {
                        material.refraction
                    };
                    (Some(dir), color, BounceKind::Transmitted)
                }
                Branch::Specular => {
                    let dir = ray.direction + rough_normal * (2.0 * cos);
                    // A lobe sample heading back into the surface ends the path
                    if dir.dot(hit.normal) > 0.0 {
                        (Some(dir), material.specular, BounceKind::Specular)
                    } else {
                        (None, Color::ZERO, BounceKind::SpecularFail)
                    }
                }
                Branch::Diffuse => {
                    let z = 2.0 * self.rng.gen::<f32>().acos() / PI;
                    let theta = self.rng.gen::<f32>() * TAU;
                    let dir = cone_direction(hit.normal, z, theta);
                    (Some(dir), material.diffuse, BounceKind::Diffuse)
                }
                Branch::Emit => {
                    debug_assert!(
                        emis_lum > 0.0,
                        "emission branch drawn with zero emission luminance"
                    );
                    (None, Color::ZERO, BounceKind::Emission)
                }
            };

            record(Some(hit), kind, fresnel);
            let Some(out_dir) = out_dir else {
                break;
            };

            // Only one weighted branch was sampled; scaling by the summed
            // luminance undoes that selection bias
            tint *= new_tint * total_lum.max(1.0);
            prev_hit = Some(hit);
            ray = Ray::new(hit.position, out_dir);
        }

        let emission = last_hit
            .map(|hit| scene.primitive(hit.primitive).material.emission)
            .unwrap_or(Color::ZERO);
        Some(tint * emission)
    }

    // Perturb a direction into its shininess lobe; infinite shininess
    // leaves it untouched.
    fn shininess_lobe(&mut self, direction: Vec3, shininess: f32) -> Vec3 {
        let z = if shininess.is_infinite() {
            1.0
        } else {
            self.rng.gen::<f32>().powf(1.0 / shininess)
        };
        let theta = self.rng.gen::<f32>() * TAU;
        cone_direction(direction, z, theta)
    }
}

impl Default for PathTracer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{Camera, Material, Primitive, Shape};

    fn scene_with(primitives: Vec<Primitive>) -> Scene {
        let mut scene = Scene::new(16, 16);
        for primitive in primitives {
            scene.add_primitive(primitive);
        }
        scene.add_camera(Camera::new());
        scene.prepare();
        scene
    }

    #[test]
    fn test_emissive_plane_returns_exact_emission() {
        let scene = scene_with(vec![Primitive::new(
            Shape::plane(Vec3::new(0.0, 0.0, -5.0), Vec3::Z),
            Material::emissive(Color::ONE),
        )]);
        let mut tracer = PathTracer::seeded(1);

        // Every first-bounce hit on a bare emitter must return exactly the
        // emission color, with zero variance
        for _ in 0..100 {
            let color = tracer.trace(&scene, Ray::new(Vec3::ZERO, -Vec3::Z));
            assert_eq!(color, Some(Color::ONE));
        }
    }

    #[test]
    fn test_instant_miss_is_none() {
        let scene = scene_with(vec![Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -5.0), 1.0),
            Material::diffuse(Color::splat(0.5)),
        )]);
        let mut tracer = PathTracer::seeded(2);

        assert_eq!(tracer.trace(&scene, Ray::new(Vec3::ZERO, Vec3::Y)), None);
    }

    #[test]
    fn test_later_miss_returns_ambient() {
        let mut scene = Scene::new(16, 16);
        scene.add_primitive(Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -5.0), 1.0),
            Material::diffuse(Color::ONE),
        ));
        scene.add_camera(Camera::new());
        scene.ambient = Color::splat(0.25);
        scene.prepare();

        let mut tracer = PathTracer::seeded(3);
        // The diffuse bounce off a lone convex sphere always leaves the
        // scene, so every sample lands on the ambient color
        for _ in 0..50 {
            let color = tracer.trace(&scene, Ray::new(Vec3::ZERO, -Vec3::Z));
            assert_eq!(color, Some(Color::splat(0.25)));
        }
    }

    #[test]
    fn test_black_surface_terminates_black() {
        let scene = scene_with(vec![Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -5.0), 1.0),
            Material::default(),
        )]);
        let mut tracer = PathTracer::seeded(4);

        let color = tracer.trace(&scene, Ray::new(Vec3::ZERO, -Vec3::Z));
        assert_eq!(color, Some(Color::ZERO));
    }

    #[test]
    fn test_lambertian_energy_conservation() {
        // Diffuse 0.5 sphere inside a uniform white emitter shell, one
        // bounce: every path picks up exactly half the emitted radiance,
        // so the estimate must converge to 0.5
        let mut scene = Scene::new(16, 16);
        scene.add_primitive(Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -5.0), 1.0),
            Material::diffuse(Color::splat(0.5)),
        ));
        scene.add_primitive(Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -5.0), 50.0),
            Material::emissive(Color::ONE),
        ));
        scene.add_camera(Camera::new());
        scene.recursion = 1;
        scene.prepare();

        let mut tracer = PathTracer::seeded(5);
        let mut sum = 0.0f64;
        let samples = 100_000;
        for _ in 0..samples {
            let color = tracer
                .trace(&scene, Ray::new(Vec3::ZERO, -Vec3::Z))
                .expect("enclosed rays cannot miss");
            sum += color.x as f64;
        }
        let mean = sum / samples as f64;
        assert!(
            (mean - 0.5).abs() < 0.025,
            "expected ~0.5 reflected radiance, got {mean}"
        );
    }

    #[test]
    fn test_total_internal_reflection_routes_to_specular() {
        let scene = scene_with(vec![Primitive::new(
            Shape::sphere(Vec3::ZERO, 1.0),
            Material::glass(Color::ONE, 1.5),
        )]);
        let mut tracer = PathTracer::seeded(6);

        // Grazing ray from inside the glass: well past the critical angle
        let ray = Ray::new(Vec3::new(0.0, 0.0, 0.999), Vec3::X);
        for _ in 0..50 {
            let records = tracer.debug_trace(&scene, ray);
            let first = records.first().expect("must record the first bounce");
            assert_eq!(first.kind, BounceKind::Specular);
            assert_eq!(first.fresnel, Some(1.0));
        }
    }

    #[test]
    fn test_near_normal_incidence_mostly_transmits() {
        let scene = scene_with(vec![Primitive::new(
            Shape::sphere(Vec3::new(0.0, 0.0, -5.0), 1.0),
            Material::glass(Color::ONE, 1.5),
        )]);
        let mut tracer = PathTracer::seeded(7);

        // At normal incidence glass reflects ~4%; transmission must dominate
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let mut transmitted = 0;
        let mut reflected = 0;
        for _ in 0..500 {
            let records = tracer.debug_trace(&scene, ray);
            match records.first().map(|record| record.kind) {
                Some(BounceKind::Transmitted) => transmitted += 1,
                Some(BounceKind::Specular) => reflected += 1,
                _ => {}
            }
        }
        assert!(
            transmitted > reflected * 3,
            "transmitted {transmitted} vs reflected {reflected}"
        );
    }

    #[test]
    fn test_debug_trace_records_emission_end() {
        let scene = scene_with(vec![Primitive::new(
            Shape::plane(Vec3::new(0.0, 0.0, -5.0), Vec3::Z),
            Material::emissive(Color::ONE),
        )]);
        let mut tracer = PathTracer::seeded(8);

        let records = tracer.debug_trace(&scene, Ray::new(Vec3::ZERO, -Vec3::Z));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, BounceKind::Emission);
        assert!(records[0].hit.is_some());
    }

    #[test]
    fn test_recursion_limit_bounds_records() {
        // A mirror box would bounce forever without the recursion limit
        let mut scene = Scene::new(16, 16);
        scene.add_primitive(Primitive::new(
            Shape::cube(Vec3::ZERO, Vec3::splat(10.0)),
            Material::mirror(Color::splat(0.9), f32::INFINITY),
        ));
        scene.add_camera(Camera::new());
        scene.recursion = 4;
        scene.prepare();

        let mut tracer = PathTracer::seeded(9);
        for _ in 0..20 {
            let records = tracer.debug_trace(
                &scene,
                Ray::directional(Vec3::ZERO, Vec3::new(0.3, 0.2, 1.0)),
            );
            assert!(records.len() <= scene.recursion as usize + 1);
        }
    }
}
