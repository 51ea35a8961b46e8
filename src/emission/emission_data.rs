//! Emission Data - Pure DOP
//!
//! NO METHODS beyond defaults. Just data.
//! All transformations happen in emission_operations.rs

use crate::constants::{emitter, textures};
use crate::gpu::ComputeBackend;
use crate::particles::color_gradient::ColorMark;
use crate::particles::emitter_data::SharedEmitter;
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Authoring-side emission parameters. Ranges are `[min, max]` in `x`/`y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionSettings {
    /// Emit every `emit_time` seconds instead of on request
    pub emit_on_timer: bool,
    /// Timer period, or the delay used by `emit_delay`
    pub emit_time: f32,
    /// Particles per emission
    pub emission_amount: u32,
    pub owned_particles: u32,
    pub lifetime: Vec2,
    pub scale: Vec2,
    /// Degrees
    pub direction: Vec2,
    /// Offset the direction range by the owning object's rotation
    pub use_object_rotation: bool,
    pub speed: Vec2,
    pub friction: Vec2,
    pub acceleration: Vec2,
    /// Degrees
    pub image_rotation: Vec2,
    pub use_direction_for_rotation: bool,
    pub albedo: Vec4,
    /// Spawn footprint of the emitter
    pub emitter_scale: Vec2,
    pub position_offset: Vec3,
    pub main_texture: String,
    pub shape_texture: String,
    pub color_gradient: Vec<ColorMark>,
}

impl Default for EmissionSettings {
    fn default() -> Self {
        Self {
            emit_on_timer: false,
            emit_time: 1.0,
            emission_amount: 10,
            owned_particles: emitter::DEFAULT_CAPACITY,
            lifetime: Vec2::new(1.0, 1.0),
            scale: Vec2::new(0.05, 0.05),
            direction: Vec2::new(0.0, 360.0),
            use_object_rotation: true,
            speed: Vec2::new(1.0, 1.0),
            friction: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            image_rotation: Vec2::ZERO,
            use_direction_for_rotation: false,
            albedo: Vec4::ONE,
            emitter_scale: Vec2::ZERO,
            position_offset: Vec3::ZERO,
            main_texture: textures::DEFAULT_MAIN_TEXTURE.to_string(),
            shape_texture: textures::DEFAULT_SHAPE_TEXTURE.to_string(),
            color_gradient: vec![ColorMark::new(0.0, Vec4::ONE)],
        }
    }
}

/// World placement of the object that owns an emission controller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmitterTransform {
    pub position: Vec3,
    /// Radians
    pub rotation: f32,
}

/// Caller-side glue that owns one emitter
pub struct EmissionController<B: ComputeBackend> {
    pub settings: EmissionSettings,
    pub emitter: SharedEmitter<B>,
    /// Used for both texture roles when a name does not resolve
    pub fallback_texture: String,
    /// Timer mode: seconds since the last emission.
    /// Delay mode: seconds left before the armed emission, 0 when idle.
    pub emission_clock: f32,
}
