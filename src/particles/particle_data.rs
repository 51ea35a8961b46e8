//! Particle Data - Pure DOP
//!
//! NO METHODS beyond constructors. GPU-visible layouts plus the spawn request
//! bundle. All transformations happen in particle_operations.rs

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// One slot of an emitter's pool, stored in GPU structured storage.
///
/// Must match `Particle` in `shaders/particle_types.wgsl` field for field.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    /// World position xyzw
    pub position: [f32; 4],
    /// Color sampled from the emitter gradient on the last step
    pub color: [f32; 4],
    pub velocity: [f32; 2],
    pub acceleration: [f32; 2],
    pub scale: f32,
    /// Image rotation in degrees
    pub rotation: f32,
    pub friction: f32,
    /// Remaining lifetime in seconds, 0 once expired
    pub lifetime: f32,
    /// Lifetime the particle was spawned with
    pub max_lifetime: f32,
    /// Seconds simulated so far, 0 until the first step
    pub age: f32,
    pub seed: u32,
    pub _padding: u32,
}

/// Gradient mark as seen by the kernel
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuColorMark {
    pub color: [f32; 4],
    pub position: f32,
    pub _padding: [f32; 3],
}

/// Per-frame block shared by every dispatch of one `update`
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GlobalParams {
    /// Reserved integer parameters
    pub params: [u32; 4],
    /// [0] elapsed seconds since the last frame, rest reserved
    pub params_f: [f32; 4],
}

/// Per-emitter block, rewritten before each emitter's dispatch
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct EmitterParams {
    pub position: [f32; 4],
    /// Footprint width and height
    pub scale: [f32; 2],
    /// [0] gradient mark count, [1] unused
    pub color_data: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<GpuParticle>(), 80);
const_assert_eq!(std::mem::size_of::<GpuColorMark>(), 32);
const_assert_eq!(std::mem::size_of::<GlobalParams>(), 32);
const_assert_eq!(std::mem::size_of::<EmitterParams>(), 32);

/// Byte stride of one particle slot
pub const PARTICLE_STRIDE: u64 = std::mem::size_of::<GpuParticle>() as u64;

/// Byte stride of one gradient mark
pub const COLOR_MARK_STRIDE: u64 = std::mem::size_of::<GpuColorMark>() as u64;

impl GlobalParams {
    pub fn for_frame(elapsed_seconds: f32) -> Self {
        Self {
            params: [0; 4],
            params_f: [elapsed_seconds, 0.0, 0.0, 0.0],
        }
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.params_f[0]
    }
}

impl EmitterParams {
    pub fn gradient_mark_count(&self) -> u32 {
        self.color_data[0].max(0.0) as u32
    }
}

/// Spawn parameter bundle. Every `Vec2` range is `[min, max]` in `x`/`y`,
/// sampled uniformly per particle; `acceleration` is an (x, y) vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub count: u32,
    /// Seconds
    pub lifetime: Vec2,
    pub scale: Vec2,
    /// Degrees
    pub direction: Vec2,
    pub speed: Vec2,
    pub friction: Vec2,
    pub acceleration: Vec2,
    /// Degrees
    pub image_rotation: Vec2,
    pub use_direction_for_rotation: bool,
}

impl Default for SpawnRequest {
    fn default() -> Self {
        Self {
            count: 10,
            lifetime: Vec2::new(1.0, 1.0),
            scale: Vec2::new(0.05, 0.05),
            direction: Vec2::new(0.0, 360.0),
            speed: Vec2::new(1.0, 1.0),
            friction: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            image_rotation: Vec2::ZERO,
            use_direction_for_rotation: false,
        }
    }
}

/// Emitter placement captured when particles are spawned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnOrigin {
    pub position: Vec4,
    /// 2D footprint; particles start uniformly inside `[-scale/2, scale/2]`
    pub footprint: Vec2,
    pub base_color: Vec4,
}
