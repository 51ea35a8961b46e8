//! Headless particle fountain
//!
//! Runs a few seconds of simulation without a window. Uses the wgpu backend
//! when an adapter is available and `--gpu` is passed, the CPU backend
//! otherwise.

use anyhow::Result;
use glam::{Vec2, Vec3, Vec4};
use hearth_particles::{
    emission::emission_operations::{emit_delay_by, late_update, set_albedo, set_colors},
    ColorMark, ComputeBackend, CpuBackend, EmissionSettings, EmitterTransform, NamedTextures,
    ParticleEngine, ParticleEngineConfig, WgpuBackend,
};
use std::sync::Arc;

const FRAME_TIME: f32 = 1.0 / 60.0;
const FRAMES: u32 = 240;

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().skip_while(|a| a != "--config").nth(1) {
        Some(path) => ParticleEngineConfig::load_from_file(path)?,
        None => ParticleEngineConfig {
            seed: Some(2024),
            ..Default::default()
        },
    };

    if std::env::args().any(|a| a == "--gpu") {
        match WgpuBackend::request_headless() {
            Ok(backend) => {
                println!("[OK] wgpu device created");
                return run(Arc::new(backend), NamedTextures::new(), config);
            }
            Err(e) => println!("[WARN] {}; falling back to the CPU backend", e),
        }
    }

    run(Arc::new(CpuBackend::new()), NamedTextures::new(), config)
}

fn run<B: ComputeBackend>(
    backend: Arc<B>,
    catalog: NamedTextures<B::Texture>,
    config: ParticleEngineConfig,
) -> Result<()> {
    let mut engine = ParticleEngine::new(backend, config)?;

    let fountain = EmissionSettings {
        emit_on_timer: true,
        emit_time: 0.1,
        emission_amount: 40,
        owned_particles: 2_000,
        lifetime: Vec2::new(1.0, 2.5),
        direction: Vec2::new(60.0, 120.0),
        speed: Vec2::new(2.0, 4.0),
        friction: Vec2::new(0.1, 0.3),
        acceleration: Vec2::new(0.0, -9.8),
        ..Default::default()
    };
    let burst = EmissionSettings {
        emission_amount: 200,
        owned_particles: 256,
        lifetime: Vec2::new(0.3, 0.8),
        speed: Vec2::new(5.0, 8.0),
        emitter_scale: Vec2::new(1.0, 1.0),
        ..Default::default()
    };

    let mut fountain = engine.create_emission_controller(&catalog, fountain)?;
    set_albedo(&mut fountain, Vec4::new(0.4, 0.7, 1.0, 1.0));
    set_colors(
        &mut fountain,
        &[
            ColorMark::new(0.0, Vec4::ONE),
            ColorMark::new(1.0, Vec4::new(0.1, 0.2, 0.8, 0.0)),
        ],
    );

    let mut burst = engine.create_emission_controller(&catalog, burst)?;
    let burst_at = EmitterTransform {
        position: Vec3::new(3.0, 1.0, 0.0),
        rotation: 0.0,
    };
    emit_delay_by(&mut burst, 1.5, &burst_at)?;

    let origin = EmitterTransform::default();
    for frame in 0..FRAMES {
        late_update(&mut fountain, FRAME_TIME, &origin)?;
        late_update(&mut burst, FRAME_TIME, &burst_at)?;

        let stats = engine.update(FRAME_TIME);
        if frame % 30 == 0 {
            println!(
                "frame {:>3}: {:>5} alive before step, {:>5} after, {} dispatches",
                frame, stats.total_alive_particles, stats.surviving_particles, stats.dispatches
            );
        }
    }

    for info in engine.render_info() {
        println!(
            "emitter {}: {}/{} alive at ({:.1}, {:.1})",
            info.id.0, info.alive_count, info.capacity, info.position.x, info.position.y
        );
    }

    println!("[OK] Simulated {} frames", FRAMES);
    Ok(())
}
