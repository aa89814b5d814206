//! Direction construction around an axis, used by the BSDF samplers.

use crate::{Quat, Vec3};

/// Any unit vector perpendicular to `v`.
///
/// Crosses against an arbitrary up vector; when `v` is that up vector the
/// cross degenerates and an arbitrary horizontal is returned instead.
pub fn perpendicular(v: Vec3) -> Vec3 {
    let cross = v.cross(Vec3::Z);
    if cross == Vec3::ZERO {
        Vec3::X
    } else {
        cross.normalize()
    }
}

/// A unit direction on the cone around `pole` at height `z` (the cosine of
/// the polar angle), rotated by `theta` around the pole.
pub fn cone_direction(pole: Vec3, z: f32, theta: f32) -> Vec3 {
    let horizontal = perpendicular(pole);
    let tilted = pole * z + horizontal * (1.0 - z * z).max(0.0).sqrt();
    Quat::from_axis_angle(pole, theta) * tilted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_perpendicular() {
        for v in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.3, -0.5, 0.8).normalize()] {
            let p = perpendicular(v);
            assert!((p.length() - 1.0).abs() < 1e-5);
            assert!(p.dot(v).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cone_direction_height() {
        let pole = Vec3::new(1.0, 2.0, -0.5).normalize();
        for z in [0.0, 0.25, 0.7, 1.0] {
            for theta in [0.0, 1.0, PI, 5.0] {
                let dir = cone_direction(pole, z, theta);
                assert!((dir.length() - 1.0).abs() < 1e-4);
                assert!((dir.dot(pole) - z).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_cone_direction_pole() {
        // z = 1 collapses the cone onto the pole itself
        let pole = Vec3::Y;
        let dir = cone_direction(pole, 1.0, 2.3);
        assert!((dir - pole).length() < 1e-5);
    }
}
