//! Emission Operations - Pure DOP Functions
//!
//! Timer and delay bookkeeping, texture name resolution and the translation
//! of `EmissionSettings` into spawn requests for the controller's emitter.

use super::emission_data::{EmissionController, EmissionSettings, EmitterTransform};
use super::texture_catalog::TextureCatalog;
use crate::constants::{emitter::MIN_CAPACITY, textures::FALLBACK_TEXTURE};
use crate::error::ParticleResult;
use crate::gpu::ComputeBackend;
use crate::particles::color_gradient::{ColorGradient, ColorMark};
use crate::particles::emitter_data::TextureRef;
use crate::particles::emitter_manager::EmitterManager;
use crate::particles::emitter_operations;
use crate::particles::particle_data::SpawnRequest;
use glam::{Vec2, Vec4};

/// Create the controller and its emitter, sized by `owned_particles`
pub fn create_controller<B, C>(
    manager: &mut EmitterManager<B>,
    catalog: &C,
    settings: EmissionSettings,
) -> ParticleResult<EmissionController<B>>
where
    B: ComputeBackend,
    C: TextureCatalog<B::Texture> + ?Sized,
{
    create_controller_with_fallback(manager, catalog, settings, FALLBACK_TEXTURE)
}

/// Like `create_controller`, with unresolved texture names replaced by
/// `fallback_texture`
pub fn create_controller_with_fallback<B, C>(
    manager: &mut EmitterManager<B>,
    catalog: &C,
    settings: EmissionSettings,
    fallback_texture: &str,
) -> ParticleResult<EmissionController<B>>
where
    B: ComputeBackend,
    C: TextureCatalog<B::Texture> + ?Sized,
{
    let capacity = settings.owned_particles.max(MIN_CAPACITY);
    let emitter = manager.create_emitter(capacity)?;

    let mut controller = EmissionController {
        settings,
        emitter,
        fallback_texture: fallback_texture.to_string(),
        emission_clock: 0.0,
    };
    controller.settings.owned_particles = capacity;
    apply_emitter_state(&mut controller, catalog);
    Ok(controller)
}

/// Recreate the emitter with a new capacity (at least 2). The old emitter is
/// released here and pruned from the registry on the next update.
pub fn set_owned_particles<B, C>(
    controller: &mut EmissionController<B>,
    manager: &mut EmitterManager<B>,
    catalog: &C,
    amount: u32,
) -> ParticleResult<()>
where
    B: ComputeBackend,
    C: TextureCatalog<B::Texture> + ?Sized,
{
    let capacity = amount.max(MIN_CAPACITY);
    controller.emitter = manager.create_emitter(capacity)?;
    controller.settings.owned_particles = capacity;
    apply_emitter_state(controller, catalog);
    Ok(())
}

fn apply_emitter_state<B, C>(controller: &mut EmissionController<B>, catalog: &C)
where
    B: ComputeBackend,
    C: TextureCatalog<B::Texture> + ?Sized,
{
    let main = controller.settings.main_texture.clone();
    let shape = controller.settings.shape_texture.clone();
    set_main_texture(controller, catalog, &main);
    set_shape_texture(controller, catalog, &shape);

    let albedo = controller.settings.albedo;
    emitter_operations::set_base_color(&mut controller.emitter.lock(), albedo);
    let marks = controller.settings.color_gradient.clone();
    set_colors(controller, &marks);
}

/// Resolve `name`, falling back to `fallback` with a warning
fn resolve_texture<T, C>(catalog: &C, name: &str, fallback: &str, role: &str) -> TextureRef<T>
where
    C: TextureCatalog<T> + ?Sized,
{
    if !name.is_empty() {
        if let Some(resource) = catalog.resolve(name) {
            return TextureRef {
                name: name.to_string(),
                resource: Some(resource),
            };
        }
    }

    log::warn!(
        "[EmissionController] {} texture '{}' does not exist, using '{}'",
        role,
        name,
        fallback
    );
    TextureRef {
        name: fallback.to_string(),
        resource: catalog.resolve(fallback),
    }
}

pub fn set_main_texture<B, C>(controller: &mut EmissionController<B>, catalog: &C, name: &str)
where
    B: ComputeBackend,
    C: TextureCatalog<B::Texture> + ?Sized,
{
    let texture = resolve_texture(catalog, name, &controller.fallback_texture, "Main");
    controller.settings.main_texture = texture.name.clone();
    emitter_operations::set_main_texture(&mut controller.emitter.lock(), texture);
}

/// Missing shape textures fall back to the main sprite fallback, not to
/// the shape default
pub fn set_shape_texture<B, C>(controller: &mut EmissionController<B>, catalog: &C, name: &str)
where
    B: ComputeBackend,
    C: TextureCatalog<B::Texture> + ?Sized,
{
    let texture = resolve_texture(catalog, name, &controller.fallback_texture, "Shape");
    controller.settings.shape_texture = texture.name.clone();
    emitter_operations::set_emitter_shape_texture(&mut controller.emitter.lock(), texture);
}

/// Replace the color ramp; the front mark always carries the albedo
pub fn set_colors<B: ComputeBackend>(controller: &mut EmissionController<B>, marks: &[ColorMark]) {
    let gradient = ColorGradient::from_marks(marks, controller.settings.albedo);
    controller.settings.color_gradient = gradient.marks().to_vec();
    emitter_operations::set_colors_gradient(&mut controller.emitter.lock(), gradient.marks());
}

pub fn set_albedo<B: ComputeBackend>(controller: &mut EmissionController<B>, albedo: Vec4) {
    controller.settings.albedo = albedo;
    match controller.settings.color_gradient.first_mut() {
        Some(front) => front.color = albedo,
        None => controller
            .settings
            .color_gradient
            .push(ColorMark::new(0.0, albedo)),
    }
    emitter_operations::set_base_color(&mut controller.emitter.lock(), albedo);
}

/// Emit after the configured `emit_time`
pub fn emit_delay<B: ComputeBackend>(
    controller: &mut EmissionController<B>,
    transform: &EmitterTransform,
) -> ParticleResult<u32> {
    let delay = controller.settings.emit_time;
    emit_delay_by(controller, delay, transform)
}

/// Arm a one-shot delayed emission. Timer-driven controllers and
/// non-positive delays emit immediately.
pub fn emit_delay_by<B: ComputeBackend>(
    controller: &mut EmissionController<B>,
    delay: f32,
    transform: &EmitterTransform,
) -> ParticleResult<u32> {
    if !controller.settings.emit_on_timer && delay > 0.0 {
        controller.emission_clock = delay;
        return Ok(0);
    }
    emit_instant(controller, transform)
}

/// Place the emitter at the transform and spawn one emission
pub fn emit_instant<B: ComputeBackend>(
    controller: &mut EmissionController<B>,
    transform: &EmitterTransform,
) -> ParticleResult<u32> {
    let settings = &controller.settings;
    let position = (transform.position + settings.position_offset).extend(1.0);
    let request = spawn_request(settings, transform);

    let mut emitter = controller.emitter.lock();
    emitter_operations::set_position(&mut emitter, position);
    emitter_operations::set_scale(&mut emitter, settings.emitter_scale);
    emitter_operations::spawn_particles(&mut emitter, &request)
}

/// Advance timers by `delta_seconds`; returns particles spawned this call
pub fn late_update<B: ComputeBackend>(
    controller: &mut EmissionController<B>,
    delta_seconds: f32,
    transform: &EmitterTransform,
) -> ParticleResult<u32> {
    if controller.settings.emit_on_timer {
        controller.emission_clock += delta_seconds;
        if controller.emission_clock >= controller.settings.emit_time {
            controller.emission_clock = 0.0;
            return emit_instant(controller, transform);
        }
    } else if controller.emission_clock > 0.0 {
        controller.emission_clock -= delta_seconds;
        if controller.emission_clock <= 0.0 {
            controller.emission_clock = 0.0;
            return emit_instant(controller, transform);
        }
    }
    Ok(0)
}

/// Spawn bundle for one emission from `transform`
pub fn spawn_request(settings: &EmissionSettings, transform: &EmitterTransform) -> SpawnRequest {
    let direction = if settings.use_object_rotation {
        settings.direction + Vec2::splat(transform.rotation.to_degrees())
    } else {
        settings.direction
    };

    SpawnRequest {
        count: settings.emission_amount,
        lifetime: settings.lifetime,
        scale: settings.scale,
        direction,
        speed: settings.speed,
        friction: settings.friction,
        acceleration: settings.acceleration,
        image_rotation: settings.image_rotation,
        use_direction_for_rotation: settings.use_direction_for_rotation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission::texture_catalog::NamedTextures;
    use crate::gpu::{CpuBackend, CpuTexture};
    use crate::particles::emitter_operations::{main_texture_name, shape_texture_name};
    use glam::Vec3;
    use std::sync::Arc;

    fn catalog() -> NamedTextures<CpuTexture> {
        let mut catalog = NamedTextures::new();
        catalog.insert("WhiteParticle", CpuTexture::solid([255; 4]));
        catalog.insert("BlueCircle", CpuTexture::solid([0, 0, 255, 255]));
        catalog
    }

    fn setup(
        settings: EmissionSettings,
    ) -> (EmitterManager<CpuBackend>, NamedTextures<CpuTexture>, EmissionController<CpuBackend>) {
        let mut manager = EmitterManager::with_seed(Arc::new(CpuBackend::new()), 3);
        let catalog = catalog();
        let controller = create_controller(&mut manager, &catalog, settings).unwrap();
        (manager, catalog, controller)
    }

    fn alive(controller: &EmissionController<CpuBackend>) -> u32 {
        controller.emitter.lock().alive_count
    }

    #[test]
    fn test_defaults_match_authoring_defaults() {
        let settings = EmissionSettings::default();
        assert_eq!(settings.owned_particles, 300);
        assert_eq!(settings.emission_amount, 10);
        assert_eq!(settings.direction, Vec2::new(0.0, 360.0));
        assert!(settings.use_object_rotation);
        assert_eq!(settings.main_texture, "WhiteParticle");
        assert_eq!(settings.shape_texture, "BlueCircle");
    }

    #[test]
    fn test_emit_instant_spawns_emission_amount() {
        let (_manager, _catalog, mut controller) = setup(EmissionSettings::default());
        let spawned = emit_instant(&mut controller, &EmitterTransform::default()).unwrap();
        assert_eq!(spawned, 10);
        assert_eq!(alive(&controller), 10);
    }

    #[test]
    fn test_emit_instant_places_emitter_with_offset() {
        let settings = EmissionSettings {
            position_offset: Vec3::new(1.0, 2.0, 0.0),
            emitter_scale: Vec2::new(4.0, 4.0),
            ..Default::default()
        };
        let (_manager, _catalog, mut controller) = setup(settings);
        let transform = EmitterTransform {
            position: Vec3::new(10.0, 0.0, 5.0),
            rotation: 0.0,
        };
        emit_instant(&mut controller, &transform).unwrap();

        let emitter = controller.emitter.lock();
        assert_eq!(emitter.position, Vec4::new(11.0, 2.0, 5.0, 1.0));
        assert_eq!(emitter.scale, Vec2::new(4.0, 4.0));
    }

    #[test]
    fn test_object_rotation_offsets_direction() {
        let settings = EmissionSettings {
            direction: Vec2::new(0.0, 10.0),
            ..Default::default()
        };
        let transform = EmitterTransform {
            position: Vec3::ZERO,
            rotation: std::f32::consts::FRAC_PI_2,
        };
        let request = spawn_request(&settings, &transform);
        assert!((request.direction.x - 90.0).abs() < 1e-4);
        assert!((request.direction.y - 100.0).abs() < 1e-4);

        let fixed = EmissionSettings {
            use_object_rotation: false,
            ..settings
        };
        assert_eq!(spawn_request(&fixed, &transform).direction, Vec2::new(0.0, 10.0));
    }

    #[test]
    fn test_delay_arms_countdown() {
        let (_manager, _catalog, mut controller) = setup(EmissionSettings::default());
        let transform = EmitterTransform::default();

        assert_eq!(emit_delay_by(&mut controller, 0.5, &transform).unwrap(), 0);
        assert_eq!(late_update(&mut controller, 0.3, &transform).unwrap(), 0);
        assert_eq!(late_update(&mut controller, 0.3, &transform).unwrap(), 10);
        assert_eq!(late_update(&mut controller, 1.0, &transform).unwrap(), 0);
        assert_eq!(alive(&controller), 10);

        assert_eq!(emit_delay_by(&mut controller, 0.0, &transform).unwrap(), 10);
    }

    #[test]
    fn test_timer_emits_every_period() {
        let settings = EmissionSettings {
            emit_on_timer: true,
            emit_time: 0.25,
            emission_amount: 3,
            ..Default::default()
        };
        let (_manager, _catalog, mut controller) = setup(settings);
        let transform = EmitterTransform::default();

        let mut spawned = 0;
        for _ in 0..10 {
            spawned += late_update(&mut controller, 0.1, &transform).unwrap();
        }
        // emissions at the 3rd, 6th and 9th tick
        assert_eq!(spawned, 9);
        assert_eq!(emit_delay(&mut controller, &transform).unwrap(), 3);
    }

    #[test]
    fn test_owned_particles_recreates_emitter() {
        let (mut manager, catalog, mut controller) = setup(EmissionSettings::default());
        emit_instant(&mut controller, &EmitterTransform::default()).unwrap();
        let old = Arc::downgrade(&controller.emitter);

        set_owned_particles(&mut controller, &mut manager, &catalog, 1).unwrap();
        assert!(old.upgrade().is_none());
        assert_eq!(controller.settings.owned_particles, 2);

        let emitter = controller.emitter.lock();
        assert_eq!(emitter.capacity, 2);
        assert_eq!(emitter.alive_count, 0);
        assert_eq!(main_texture_name(&emitter), Some("WhiteParticle"));
        assert_eq!(manager.live_count(), 1);
    }

    #[test]
    fn test_unknown_textures_fall_back_to_white_particle() {
        let (_manager, catalog, mut controller) = setup(EmissionSettings::default());
        set_main_texture(&mut controller, &catalog, "NoSuchSprite");
        set_shape_texture(&mut controller, &catalog, "");

        assert_eq!(controller.settings.main_texture, "WhiteParticle");
        assert_eq!(controller.settings.shape_texture, "WhiteParticle");
        let emitter = controller.emitter.lock();
        assert_eq!(shape_texture_name(&emitter), Some("WhiteParticle"));
        assert!(emitter_operations::shape_mask(&emitter).is_some());
    }

    #[test]
    fn test_configured_fallback_replaces_white_particle() {
        let mut manager = EmitterManager::with_seed(Arc::new(CpuBackend::new()), 9);
        let mut catalog = catalog();
        catalog.insert("Spark", CpuTexture::solid([255, 200, 0, 255]));
        let settings = EmissionSettings {
            main_texture: "Missing".to_string(),
            shape_texture: "AlsoMissing".to_string(),
            ..Default::default()
        };

        let controller =
            create_controller_with_fallback(&mut manager, &catalog, settings, "Spark").unwrap();

        assert_eq!(controller.settings.main_texture, "Spark");
        assert_eq!(controller.settings.shape_texture, "Spark");
        let emitter = controller.emitter.lock();
        assert_eq!(main_texture_name(&emitter), Some("Spark"));
        assert_eq!(shape_texture_name(&emitter), Some("Spark"));
        assert!(emitter_operations::shape_mask(&emitter).is_some());
    }

    #[test]
    fn test_known_shape_texture_is_kept() {
        let (_manager, _catalog, controller) = setup(EmissionSettings::default());
        let emitter = controller.emitter.lock();
        assert_eq!(shape_texture_name(&emitter), Some("BlueCircle"));
    }

    #[test]
    fn test_albedo_drives_gradient_front() {
        let (_manager, _catalog, mut controller) = setup(EmissionSettings::default());
        let orange = Vec4::new(1.0, 0.5, 0.0, 1.0);
        set_colors(
            &mut controller,
            &[ColorMark::new(0.0, Vec4::ZERO), ColorMark::new(1.0, Vec4::ZERO)],
        );
        set_albedo(&mut controller, orange);

        assert_eq!(controller.settings.color_gradient[0].color, orange);
        let emitter = controller.emitter.lock();
        assert_eq!(emitter.gradient.front().color, orange);
        assert_eq!(emitter.gradient.len(), 2);
        assert_eq!(emitter.base_color, orange);
    }
}
