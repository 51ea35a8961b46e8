//! Emitter Operations - Pure DOP Functions
//!
//! Everything that reads or changes an `EmitterData`. Spawning and gradient
//! edits happen between frames; `sync_gradient`, `swap_buffers` and
//! `compact` are driven by the simulation scheduler.

use super::color_gradient::{ColorGradient, ColorMark};
use super::emitter_data::{EmitterData, EmitterId, ParticlePool, TextureRef};
use super::particle_data::{
    EmitterParams, GpuParticle, SpawnOrigin, SpawnRequest, COLOR_MARK_STRIDE, PARTICLE_STRIDE,
};
use super::particle_operations::spawn_particle;
use crate::constants::emitter::{INITIAL_GRADIENT_MARKS, MIN_CAPACITY};
use crate::error::{GpuErrorContext, ParticleError, ParticleResult};
use crate::gpu::{ComputeBackend, GpuError};
use glam::{Vec2, Vec4};
use rand::rngs::StdRng;
use std::sync::Arc;

/// Allocate both particle buffers and the gradient storage.
///
/// Capacity bounds are the manager's business; this only refuses 0.
pub fn create_emitter_data<B: ComputeBackend>(
    backend: Arc<B>,
    id: EmitterId,
    capacity: u32,
    rng: StdRng,
) -> ParticleResult<EmitterData<B>> {
    if capacity == 0 {
        return Err(ParticleError::InvalidCapacity {
            requested: capacity,
            min: 1,
            max: u32::MAX,
        });
    }

    if capacity < MIN_CAPACITY {
        log::debug!(
            "[Emitter] Capacity {} is below the usual minimum of {}",
            capacity,
            MIN_CAPACITY
        );
    }

    let pool_size = capacity as u64 * PARTICLE_STRIDE;
    let slots = [
        backend
            .create_storage_buffer(&format!("Emitter {} Particles A", id.0), pool_size)
            .gpu_context("create particle buffer")?,
        backend
            .create_storage_buffer(&format!("Emitter {} Particles B", id.0), pool_size)
            .gpu_context("create particle buffer")?,
    ];

    let gradient_buffer = backend
        .create_storage_buffer(
            &format!("Emitter {} Gradient", id.0),
            INITIAL_GRADIENT_MARKS as u64 * COLOR_MARK_STRIDE,
        )
        .gpu_context("create gradient buffer")?;

    let base_color = Vec4::ONE;

    log::debug!(
        "[Emitter] Created emitter {} with {} slots on '{}'",
        id.0,
        capacity,
        backend.name()
    );

    Ok(EmitterData {
        id,
        backend,
        capacity,
        alive_count: 0,
        pool: ParticlePool { slots, front: 0 },
        gradient: ColorGradient::new(base_color),
        gradient_buffer,
        gradient_capacity: INITIAL_GRADIENT_MARKS,
        gradient_dirty: true,
        position: Vec4::new(0.0, 0.0, 0.0, 1.0),
        scale: Vec2::ZERO,
        base_color,
        main_texture: None,
        shape_texture: None,
        rng,
    })
}

/// Append up to `request.count` particles into the free tail of the front
/// buffer. Requests past capacity are dropped; returns how many were written.
pub fn spawn_particles<B: ComputeBackend>(
    emitter: &mut EmitterData<B>,
    request: &SpawnRequest,
) -> ParticleResult<u32> {
    let free = emitter.capacity - emitter.alive_count;
    let effective = request.count.min(free);

    if effective < request.count {
        log::trace!(
            "[Emitter] Emitter {} dropped {} of {} spawn requests (capacity {})",
            emitter.id.0,
            request.count - effective,
            request.count,
            emitter.capacity
        );
    }
    if effective == 0 {
        return Ok(0);
    }

    let origin = SpawnOrigin {
        position: emitter.position,
        footprint: emitter.scale,
        base_color: emitter.base_color,
    };
    let particles: Vec<GpuParticle> = (0..effective)
        .map(|_| spawn_particle(&mut emitter.rng, request, &origin))
        .collect();

    let offset = emitter.alive_count as u64 * PARTICLE_STRIDE;
    emitter
        .backend
        .write_buffer(
            front_buffer(&emitter.pool),
            offset,
            bytemuck::cast_slice(&particles),
        )
        .gpu_context("spawn particles")?;

    emitter.alive_count += effective;
    Ok(effective)
}

pub fn set_position<B: ComputeBackend>(emitter: &mut EmitterData<B>, position: Vec4) {
    emitter.position = position;
}

pub fn set_scale<B: ComputeBackend>(emitter: &mut EmitterData<B>, scale: Vec2) {
    emitter.scale = scale;
}

/// Change the base color; the gradient's front mark follows it
pub fn set_base_color<B: ComputeBackend>(emitter: &mut EmitterData<B>, color: Vec4) {
    emitter.base_color = color;
    emitter.gradient.sync_base_color(color);
    emitter.gradient_dirty = true;
}

/// Replace the gradient. Empty input leaves a single base-color mark and the
/// front mark is always the base color.
pub fn set_colors_gradient<B: ComputeBackend>(emitter: &mut EmitterData<B>, marks: &[ColorMark]) {
    emitter.gradient = ColorGradient::from_marks(marks, emitter.base_color);
    emitter.gradient_dirty = true;
}

pub fn set_main_texture<B: ComputeBackend>(
    emitter: &mut EmitterData<B>,
    texture: TextureRef<B::Texture>,
) {
    log::trace!(
        "[Emitter] Emitter {} main texture '{}'",
        emitter.id.0,
        texture.name
    );
    emitter.main_texture = Some(texture);
}

pub fn set_emitter_shape_texture<B: ComputeBackend>(
    emitter: &mut EmitterData<B>,
    texture: TextureRef<B::Texture>,
) {
    log::trace!(
        "[Emitter] Emitter {} shape texture '{}'",
        emitter.id.0,
        texture.name
    );
    emitter.shape_texture = Some(texture);
}

/// Upload the gradient if it changed, growing the buffer when needed
pub fn sync_gradient<B: ComputeBackend>(emitter: &mut EmitterData<B>) -> Result<(), GpuError> {
    if !emitter.gradient_dirty {
        return Ok(());
    }

    let marks = emitter.gradient.to_gpu();
    let needed = marks.len() as u32;
    if needed > emitter.gradient_capacity {
        let grown = needed.next_power_of_two();
        emitter.gradient_buffer = emitter.backend.create_storage_buffer(
            &format!("Emitter {} Gradient", emitter.id.0),
            grown as u64 * COLOR_MARK_STRIDE,
        )?;
        emitter.gradient_capacity = grown;
    }

    emitter
        .backend
        .write_buffer(&emitter.gradient_buffer, 0, bytemuck::cast_slice(&marks))?;
    emitter.gradient_dirty = false;
    Ok(())
}

/// Per-emitter parameter block for the next dispatch
pub fn emitter_params<B: ComputeBackend>(emitter: &EmitterData<B>) -> EmitterParams {
    EmitterParams {
        position: emitter.position.to_array(),
        scale: emitter.scale.to_array(),
        color_data: [emitter.gradient.len() as f32, 0.0],
    }
}

pub fn front_buffer<Buf>(pool: &ParticlePool<Buf>) -> &Buf {
    &pool.slots[pool.front]
}

pub fn back_buffer<Buf>(pool: &ParticlePool<Buf>) -> &Buf {
    &pool.slots[1 - pool.front]
}

/// Flip roles so the kernel's output becomes next frame's input
pub fn swap_buffers<Buf>(pool: &mut ParticlePool<Buf>) {
    pool.front = 1 - pool.front;
}

/// Pack survivors into `[0, new_alive)` of the front buffer, using the back
/// buffer as scratch. Never raises the alive count.
pub fn compact<B: ComputeBackend>(emitter: &mut EmitterData<B>) -> Result<u32, GpuError> {
    let survivors = emitter.backend.partition_alive_dead(
        front_buffer(&emitter.pool),
        back_buffer(&emitter.pool),
        emitter.alive_count,
    )?;

    emitter.alive_count = survivors.min(emitter.alive_count);
    Ok(emitter.alive_count)
}

pub fn main_texture_name<B: ComputeBackend>(emitter: &EmitterData<B>) -> Option<&str> {
    emitter.main_texture.as_ref().map(|t| t.name.as_str())
}

pub fn shape_texture_name<B: ComputeBackend>(emitter: &EmitterData<B>) -> Option<&str> {
    emitter.shape_texture.as_ref().map(|t| t.name.as_str())
}

/// Shape mask to bind, only when the texture actually resolved
pub fn shape_mask<B: ComputeBackend>(emitter: &EmitterData<B>) -> Option<&B::Texture> {
    emitter
        .shape_texture
        .as_ref()
        .and_then(|t| t.resource.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CpuBackend;
    use rand::SeedableRng;

    fn emitter(capacity: u32) -> EmitterData<CpuBackend> {
        create_emitter_data(
            Arc::new(CpuBackend::new()),
            EmitterId(1),
            capacity,
            StdRng::seed_from_u64(11),
        )
        .unwrap()
    }

    fn request(count: u32) -> SpawnRequest {
        SpawnRequest {
            count,
            ..Default::default()
        }
    }

    #[test]
    fn test_spawn_clamps_to_capacity() {
        let mut emitter = emitter(2);
        assert_eq!(spawn_particles(&mut emitter, &request(5)).unwrap(), 2);
        assert_eq!(emitter.alive_count, 2);
        assert_eq!(spawn_particles(&mut emitter, &request(1)).unwrap(), 0);
        assert_eq!(emitter.alive_count, 2);
    }

    #[test]
    fn test_spawn_with_constant_lifetime() {
        let mut emitter = emitter(300);
        let spawned = spawn_particles(
            &mut emitter,
            &SpawnRequest {
                count: 10,
                lifetime: Vec2::new(1.0, 1.0),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(spawned, 10);
        assert_eq!(emitter.alive_count, 10);
        let particles = front_buffer(&emitter.pool).read_particles(10);
        assert!(particles.iter().all(|p| p.lifetime == 1.0));
    }

    #[test]
    fn test_spawn_appends_after_alive_range() {
        let mut emitter = emitter(8);
        set_position(&mut emitter, Vec4::new(1.0, 0.0, 0.0, 1.0));
        spawn_particles(&mut emitter, &request(3)).unwrap();
        set_position(&mut emitter, Vec4::new(9.0, 0.0, 0.0, 1.0));
        spawn_particles(&mut emitter, &request(2)).unwrap();

        let particles = front_buffer(&emitter.pool).read_particles(5);
        assert!(particles[..3].iter().all(|p| p.position[0] == 1.0));
        assert!(particles[3..].iter().all(|p| p.position[0] == 9.0));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = create_emitter_data(
            Arc::new(CpuBackend::new()),
            EmitterId(0),
            0,
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(ParticleError::InvalidCapacity { .. })));
    }

    #[test]
    fn test_gradient_front_follows_base_color() {
        let mut emitter = emitter(4);
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);

        set_base_color(&mut emitter, red);
        set_colors_gradient(&mut emitter, &[ColorMark::new(0.0, blue), ColorMark::new(1.0, blue)]);
        assert_eq!(emitter.gradient.front().color, red);
        assert_eq!(emitter.gradient.marks()[1].color, blue);

        set_colors_gradient(&mut emitter, &[]);
        assert_eq!(emitter.gradient.marks(), &[ColorMark::new(0.0, red)]);
    }

    #[test]
    fn test_gradient_buffer_grows() {
        let mut emitter = emitter(4);
        let marks: Vec<ColorMark> = (0..11)
            .map(|i| ColorMark::new(i as f32 / 10.0, Vec4::ONE))
            .collect();
        set_colors_gradient(&mut emitter, &marks);
        sync_gradient(&mut emitter).unwrap();

        assert_eq!(emitter.gradient_capacity, 16);
        assert!(!emitter.gradient_dirty);
        assert_eq!(emitter_params(&emitter).color_data[0], 11.0);
    }

    #[test]
    fn test_swap_alternates_roles() {
        let mut emitter = emitter(4);
        let first = front_buffer(&emitter.pool) as *const _;
        swap_buffers(&mut emitter.pool);
        assert!(std::ptr::eq(back_buffer(&emitter.pool), first));
        swap_buffers(&mut emitter.pool);
        assert!(std::ptr::eq(front_buffer(&emitter.pool), first));
    }

    #[test]
    fn test_compact_never_raises_alive_count() {
        let mut emitter = emitter(4);
        spawn_particles(&mut emitter, &request(4)).unwrap();
        let dead = GpuParticle::default();
        emitter
            .backend
            .write_buffer(
                front_buffer(&emitter.pool),
                PARTICLE_STRIDE,
                bytemuck::bytes_of(&dead),
            )
            .unwrap();

        assert_eq!(compact(&mut emitter).unwrap(), 3);
        assert_eq!(emitter.alive_count, 3);
    }
}
