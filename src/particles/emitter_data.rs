//! Emitter Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in emitter_operations.rs

use super::color_gradient::ColorGradient;
use crate::gpu::ComputeBackend;
use glam::{Vec2, Vec4};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use std::sync::{Arc, Weak};

/// Stable identifier, unique per manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(pub u64);

/// Two particle buffers with a role flag.
///
/// `slots[front]` is read by the next dispatch and receives spawns;
/// `slots[1 - front]` is the kernel's write target.
pub struct ParticlePool<Buf> {
    pub slots: [Buf; 2],
    pub front: usize,
}

/// A texture assigned by name, with the device resource when it resolved
pub struct TextureRef<T> {
    pub name: String,
    pub resource: Option<Arc<T>>,
}

pub struct EmitterData<B: ComputeBackend> {
    pub id: EmitterId,
    pub backend: Arc<B>,

    /// Fixed at creation
    pub capacity: u32,
    /// Slots `[0, alive_count)` of the front buffer hold live particles
    pub alive_count: u32,
    pub pool: ParticlePool<B::Buffer>,

    pub gradient: ColorGradient,
    pub gradient_buffer: B::Buffer,
    /// Marks the gradient buffer can hold
    pub gradient_capacity: u32,
    /// Host gradient changed since the last upload
    pub gradient_dirty: bool,

    pub position: Vec4,
    /// 2D footprint particles spawn inside
    pub scale: Vec2,
    pub base_color: Vec4,

    pub main_texture: Option<TextureRef<B::Texture>>,
    pub shape_texture: Option<TextureRef<B::Texture>>,

    pub rng: StdRng,
}

/// Owning handle returned to callers
pub type SharedEmitter<B> = Arc<Mutex<EmitterData<B>>>;

/// Registry entry; never keeps an emitter alive
pub type WeakEmitter<B> = Weak<Mutex<EmitterData<B>>>;

impl<B: ComputeBackend> Drop for EmitterData<B> {
    fn drop(&mut self) {
        log::debug!(
            "[Emitter] Releasing emitter {} ({} slots, {} alive)",
            self.id.0,
            self.capacity,
            self.alive_count
        );
    }
}
