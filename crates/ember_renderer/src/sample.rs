//! Per-pixel sample accumulation.

use ember_core::Color;
use ember_math::DVec3;
use image::RgbaImage;

const GAMMA: f64 = 1.0 / 2.2;

/// Running statistics for one pixel of a render pass.
///
/// Hit colors accumulate into a double-precision sum (a long pass adds
/// hundreds of thousands of samples); misses are only counted. Grows
/// monotonically; reset only when a new render starts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleSet {
    color: DVec3,
    samples: u32,
    misses: u32,
}

impl SampleSet {
    /// Add a hit sample to the pixel.
    pub fn add_sample(&mut self, color: Color) {
        self.color += color.as_dvec3();
        self.samples += 1;
    }

    /// Add a missed sample to the pixel.
    pub fn add_miss(&mut self) {
        self.misses += 1;
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Accumulated color sum over all hit samples.
    pub fn color_sum(&self) -> DVec3 {
        self.color
    }

    /// Mean sample color, before exposure and gamma.
    pub fn mean(&self) -> DVec3 {
        if self.samples == 0 {
            DVec3::ZERO
        } else {
            self.color / self.samples as f64
        }
    }

    /// Calculate the final display color for this pixel.
    ///
    /// Pixels without any hit sample show the exposed background. Otherwise
    /// the mean sample color is blended toward the background by the miss
    /// fraction, gamma corrected, and quantized to 8-bit RGBA.
    pub fn output(&self, background: Color, background_alpha: f32, exposure: f32) -> [u8; 4] {
        if self.samples == 0 {
            return [
                quantize(background.x as f64 * exposure as f64),
                quantize(background.y as f64 * exposure as f64),
                quantize(background.z as f64 * exposure as f64),
                quantize(background_alpha as f64),
            ];
        }

        let total = (self.samples + self.misses) as f64;
        let mult = exposure as f64 / self.samples as f64;

        let mut r = self.color.x * mult;
        let mut g = self.color.y * mult;
        let mut b = self.color.z * mult;
        let mut a = 1.0f64;

        let back_alpha_amt = self.misses as f64 / total;
        let back_amt = back_alpha_amt * background_alpha as f64;

        r += (background.x as f64 - r) * back_amt;
        g += (background.y as f64 - g) * back_amt;
        b += (background.z as f64 - b) * back_amt;
        a += (background_alpha as f64 - a) * back_alpha_amt;

        [
            quantize(r.powf(GAMMA)),
            quantize(g.powf(GAMMA)),
            quantize(b.powf(GAMMA)),
            quantize(a),
        ]
    }
}

fn quantize(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// The per-pixel sample grid for a whole frame.
///
/// Written only by the supervisory thread while a render runs; preview
/// queries read through a lock held by the renderer.
#[derive(Debug, Clone, Default)]
pub struct SampleGrid {
    width: u32,
    height: u32,
    sets: Vec<SampleSet>,
}

impl SampleGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sets: vec![SampleSet::default(); (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The sample set at (x, y), clamped to the grid edges. An empty grid
    /// yields a default (all-zero) set.
    pub fn at(&self, x: u32, y: u32) -> SampleSet {
        if self.sets.is_empty() {
            return SampleSet::default();
        }
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.sets[(y * self.width + x) as usize]
    }

    pub fn at_mut(&mut self, x: u32, y: u32) -> &mut SampleSet {
        &mut self.sets[(y * self.width + x) as usize]
    }

    /// Convert the whole grid to a preview image.
    pub fn to_image(&self, background: Color, background_alpha: f32, exposure: f32) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            image::Rgba(self.at(x, y).output(background, background_alpha, exposure))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_math::Vec3;

    #[test]
    fn test_accumulation() {
        let mut set = SampleSet::default();
        set.add_sample(Vec3::new(1.0, 0.5, 0.0));
        set.add_sample(Vec3::new(0.0, 0.5, 1.0));
        set.add_miss();

        assert_eq!(set.samples(), 2);
        assert_eq!(set.misses(), 1);
        assert_eq!(set.mean(), DVec3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_output_background_when_empty() {
        let set = SampleSet::default();
        let out = set.output(Vec3::new(1.0, 0.0, 0.0), 0.5, 1.0);
        // Background passes through without gamma correction
        assert_eq!(out, [255, 0, 0, 127]);
    }

    #[test]
    fn test_output_gamma_corrected_mean() {
        let mut set = SampleSet::default();
        set.add_sample(Vec3::splat(0.25));
        set.add_sample(Vec3::splat(0.75));

        let out = set.output(Vec3::ZERO, 0.0, 1.0);
        let expected = (0.5f64.powf(GAMMA) * 255.0) as u8;
        assert_eq!(out[0], expected);
        assert_eq!(out[1], expected);
        assert_eq!(out[2], expected);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn test_output_exposure_scales() {
        let mut set = SampleSet::default();
        set.add_sample(Vec3::splat(0.2));

        let dim = set.output(Vec3::ZERO, 0.0, 1.0);
        let bright = set.output(Vec3::ZERO, 0.0, 3.0);
        assert!(bright[0] > dim[0]);
    }

    #[test]
    fn test_misses_blend_alpha() {
        let mut set = SampleSet::default();
        set.add_sample(Vec3::ONE);
        set.add_miss();

        // Half the samples missed against a fully transparent background
        let out = set.output(Vec3::ZERO, 0.0, 1.0);
        assert_eq!(out[3], 127);
    }

    #[test]
    fn test_grid_indexing_and_clamping() {
        let mut grid = SampleGrid::new(4, 3);
        grid.at_mut(2, 1).add_sample(Vec3::ONE);

        assert_eq!(grid.at(2, 1).samples(), 1);
        assert_eq!(grid.at(0, 0).samples(), 0);
        // Out-of-range queries clamp to the edge
        assert_eq!(grid.at(100, 100).samples(), grid.at(3, 2).samples());
    }

    #[test]
    fn test_grid_to_image_dimensions() {
        let grid = SampleGrid::new(8, 6);
        let image = grid.to_image(Vec3::ZERO, 0.0, 1.0);
        assert_eq!(image.dimensions(), (8, 6));
    }
}
