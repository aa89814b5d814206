//! Surface material: per-channel response colors plus optics parameters.

use ember_math::Vec3;
use serde::{Deserialize, Serialize};

/// Color type alias (linear RGB, values typically 0-1)
pub type Color = Vec3;

/// Perceived brightness of a color (Rec. 601 weights).
///
/// The integrator uses luminance as the sampling weight when choosing
/// between BSDF branches.
pub fn luminance(color: Color) -> f32 {
    0.299 * color.x + 0.587 * color.y + 0.114 * color.z
}

/// How light interacts with a surface.
///
/// Each response channel is a color whose luminance doubles as the
/// probability weight for sampling that light-transport branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Light bounced in all directions off the surface.
    pub diffuse: Color,
    /// Light bounced across the surface normal.
    pub specular: Color,
    /// Light transmitted through the surface.
    pub refraction: Color,
    /// Light emitted from the surface.
    pub emission: Color,
    /// Surface smoothness affecting specular and refraction.
    ///
    /// Values close to (but greater than) zero are rough; infinity is
    /// perfectly smooth.
    pub shininess: f32,
    /// Refractive index of the medium behind the surface.
    ///
    /// Zero disables the Fresnel reflection/transmission split entirely.
    pub refractive_index: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Color::ZERO,
            specular: Color::ZERO,
            refraction: Color::ZERO,
            emission: Color::ZERO,
            shininess: 100.0,
            refractive_index: 0.0,
        }
    }
}

impl Material {
    /// A purely diffuse surface.
    pub fn diffuse(color: Color) -> Self {
        Self {
            diffuse: color,
            ..Default::default()
        }
    }

    /// A light-emitting surface.
    pub fn emissive(color: Color) -> Self {
        Self {
            emission: color,
            ..Default::default()
        }
    }

    /// A specular reflector; infinite shininess gives a perfect mirror.
    pub fn mirror(color: Color, shininess: f32) -> Self {
        Self {
            specular: color,
            shininess,
            ..Default::default()
        }
    }

    /// A transmissive dielectric with the given refractive index.
    pub fn glass(color: Color, refractive_index: f32) -> Self {
        Self {
            refraction: color,
            specular: Color::splat(0.9),
            shininess: f32::INFINITY,
            refractive_index,
            ..Default::default()
        }
    }
}
