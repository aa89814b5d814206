//! Ember Renderer - CPU path tracing.
//!
//! A progressive Monte Carlo path tracer:
//!
//! - [`Renderer`] owns the worker pool, distributes tiles, accumulates
//!   samples and exposes the pause/resume/stop control surface
//! - [`PathTracer`] traces individual camera samples through the scene
//! - [`SampleSet`] holds the per-pixel running statistics
//! - [`DebugRaycaster`] renders classification overlays for inspection

mod debug;
mod renderer;
mod sample;
mod tile;
mod tracer;

pub use debug::{DebugMode, DebugRaycaster};
pub use renderer::{RenderError, RenderSettings, Renderer};
pub use sample::{SampleGrid, SampleSet};
pub use tile::{generate_tiles, Tile};
pub use tracer::{BounceKind, BounceRecord, PathTracer};

/// Re-export the core scene types alongside the renderer
pub use ember_core::{Camera, Color, Material, Primitive, Scene, Shape};
