//! Progressive render demo.
//!
//! Builds a small scene, renders it for a few seconds on all cores, then
//! writes the preview to a PNG.
//!
//! Run with: cargo run --release --example simple_render

use anyhow::Result;
use ember_renderer::{
    Camera, Color, Material, Primitive, RenderSettings, Renderer, Scene, Shape,
};
use ember_math::Vec3;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let scene = build_scene();
    let settings = RenderSettings::default();
    println!(
        "rendering {}x{} on {} threads...",
        scene.width, scene.height, settings.threads
    );

    let renderer = Renderer::new(
        scene,
        settings,
        |status, progress, _preview| {
            print!("\r{status} ({:.1}%)        ", progress * 100.0);
        },
        |_overlay| {},
    );

    std::thread::scope(|scope| -> Result<()> {
        let supervisor = scope.spawn(|| renderer.start());

        std::thread::sleep(Duration::from_secs(10));
        renderer.stop();
        supervisor
            .join()
            .expect("supervisor panicked")
            .map_err(|error| anyhow::anyhow!(error))?;
        Ok(())
    })?;

    println!();
    let filename = "output.png";
    renderer.preview().save(filename)?;
    println!("saved to {filename}");
    Ok(())
}

fn build_scene() -> Scene {
    let mut scene = Scene::new(800, 450);
    scene.recursion = 5;
    scene.ambient = Color::splat(0.05);
    scene.background = Color::new(0.01, 0.01, 0.02);

    // Ground
    scene.add_primitive(Primitive::new(
        Shape::plane(Vec3::new(0.0, -1.0, 0.0), Vec3::Y),
        Material::diffuse(Color::splat(0.6)),
    ));

    // Key light overhead
    scene.add_primitive(Primitive::new(
        Shape::sphere(Vec3::new(-3.0, 8.0, -2.0), 3.0),
        Material::emissive(Color::splat(6.0)),
    ));

    // Matte sphere
    scene.add_primitive(Primitive::new(
        Shape::sphere(Vec3::new(-1.6, 0.0, -4.0), 1.0),
        Material::diffuse(Color::new(0.7, 0.25, 0.2)),
    ));

    // Glass sphere
    scene.add_primitive(Primitive::new(
        Shape::sphere(Vec3::new(0.6, 0.0, -3.0), 1.0),
        Material::glass(Color::new(0.95, 0.95, 1.0), 1.5),
    ));

    // Rough mirror cube
    scene.add_primitive(Primitive::new(
        Shape::cube(Vec3::new(2.6, -0.25, -5.0), Vec3::splat(1.5)),
        Material::mirror(Color::splat(0.8), 2000.0),
    ));

    // A tilted emissive triangle as a rim light
    scene.add_primitive(Primitive::new(
        Shape::triangle(
            Vec3::new(4.0, 0.5, -2.0),
            Vec3::new(5.0, 2.5, -3.0),
            Vec3::new(3.5, 2.0, -1.5),
        ),
        Material::emissive(Color::new(1.5, 1.2, 0.8)),
    ));

    scene.add_camera(
        Camera::new()
            .with_position(Vec3::new(0.0, 1.2, 2.5), Vec3::new(0.0, 0.0, -4.0), Vec3::Y)
            .with_lens(55.0, 0.0, 6.5),
    );

    scene
}
