//! Emitter registry
//!
//! The manager hands out the only owning handle and keeps a weak entry per
//! emitter. Dropping the handle frees the emitter at once; the stale entry is
//! swept by the scheduler on its next pass.

use super::emitter_data::{EmitterId, SharedEmitter, WeakEmitter};
use super::emitter_operations::create_emitter_data;
use crate::constants::emitter::MAX_CAPACITY;
use crate::error::{ParticleError, ParticleResult};
use crate::gpu::ComputeBackend;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

pub struct EmitterManager<B: ComputeBackend> {
    backend: Arc<B>,
    emitters: Vec<WeakEmitter<B>>,
    next_id: u64,
    max_capacity: u32,
    /// Per-emitter RNGs derive from this when set
    seed: Option<u64>,
}

impl<B: ComputeBackend> EmitterManager<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let max_capacity = MAX_CAPACITY.min(backend.max_dispatch_size());
        Self {
            backend,
            emitters: Vec::new(),
            next_id: 0,
            max_capacity,
            seed: None,
        }
    }

    /// Deterministic spawning: emitter `n` draws from `seed + n`
    pub fn with_seed(backend: Arc<B>, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new(backend)
        }
    }

    /// Upper capacity bound, also capped by the backend's dispatch limit
    pub fn set_max_capacity(&mut self, max_capacity: u32) {
        self.max_capacity = max_capacity.min(self.backend.max_dispatch_size());
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Allocate an emitter and return the sole owning handle
    pub fn create_emitter(&mut self, capacity: u32) -> ParticleResult<SharedEmitter<B>> {
        if capacity == 0 || capacity > self.max_capacity {
            return Err(ParticleError::InvalidCapacity {
                requested: capacity,
                min: 1,
                max: self.max_capacity,
            });
        }

        let id = EmitterId(self.next_id);
        self.next_id += 1;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.0)),
            None => StdRng::from_entropy(),
        };

        let data = create_emitter_data(Arc::clone(&self.backend), id, capacity, rng)?;
        let emitter = Arc::new(Mutex::new(data));
        self.emitters.push(Arc::downgrade(&emitter));

        log::debug!(
            "[EmitterManager] Registered emitter {} ({} registry entries)",
            id.0,
            self.emitters.len()
        );

        Ok(emitter)
    }

    /// Registry entries, including ones whose emitter is already gone
    pub fn emitters(&self) -> &[WeakEmitter<B>] {
        &self.emitters
    }

    /// Mutable registry for the scheduler's sweep
    pub fn emitters_mut(&mut self) -> &mut Vec<WeakEmitter<B>> {
        &mut self.emitters
    }

    /// Entries whose emitter is still owned
    pub fn live_count(&self) -> usize {
        self.emitters
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
