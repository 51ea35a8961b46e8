//! Particle engine facade
//!
//! Owns the emitter registry and the scheduler. The application calls
//! `update` once per frame from one thread.

use crate::config::ParticleEngineConfig;
use crate::emission::emission_operations::create_controller_with_fallback;
use crate::emission::{EmissionController, EmissionSettings, TextureCatalog};
use crate::error::ParticleResult;
use crate::gpu::ComputeBackend;
use crate::particles::emitter_data::{EmitterId, TextureRef};
use crate::particles::emitter_operations::front_buffer;
use crate::particles::{EmitterManager, FrameStats, SharedEmitter, SimulationScheduler};
use glam::Vec4;
use std::sync::Arc;

/// Per-emitter summary for a downstream renderer
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterRenderInfo {
    pub id: EmitterId,
    pub alive_count: u32,
    pub capacity: u32,
    pub position: Vec4,
    pub main_texture: Option<String>,
}

/// Borrowed view of one emitter's drawable particles
pub struct RenderBatch<'a, B: ComputeBackend> {
    pub id: EmitterId,
    /// Particles `[0, alive_count)` of `particles` are alive
    pub alive_count: u32,
    pub particles: &'a B::Buffer,
    pub main_texture: Option<&'a TextureRef<B::Texture>>,
}

pub struct ParticleEngine<B: ComputeBackend> {
    config: ParticleEngineConfig,
    manager: EmitterManager<B>,
    scheduler: SimulationScheduler<B>,
    last_stats: FrameStats,
}

impl<B: ComputeBackend> ParticleEngine<B> {
    pub fn new(backend: Arc<B>, config: ParticleEngineConfig) -> ParticleResult<Self> {
        log::debug!("[ParticleEngine::new] Starting particle engine initialization");
        config.validate()?;

        let mut manager = match config.seed {
            Some(seed) => EmitterManager::with_seed(Arc::clone(&backend), seed),
            None => EmitterManager::new(Arc::clone(&backend)),
        };
        manager.set_max_capacity(config.max_capacity);

        let scheduler = SimulationScheduler::new(backend, &config.kernel_source())?;

        log::info!(
            "[ParticleEngine::new] Initialized (max capacity {})",
            manager.max_capacity()
        );

        Ok(Self {
            config,
            manager,
            scheduler,
            last_stats: FrameStats::default(),
        })
    }

    pub fn config(&self) -> &ParticleEngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &EmitterManager<B> {
        &self.manager
    }

    pub fn scheduler(&self) -> &SimulationScheduler<B> {
        &self.scheduler
    }

    pub fn backend(&self) -> &Arc<B> {
        self.manager.backend()
    }

    pub fn create_emitter(&mut self, capacity: u32) -> ParticleResult<SharedEmitter<B>> {
        self.manager.create_emitter(capacity)
    }

    pub fn create_default_emitter(&mut self) -> ParticleResult<SharedEmitter<B>> {
        self.manager.create_emitter(self.config.default_capacity)
    }

    /// Controller with its owned-particle count clamped to the configured
    /// range and unresolved textures replaced by the configured default
    pub fn create_emission_controller<C>(
        &mut self,
        catalog: &C,
        mut settings: EmissionSettings,
    ) -> ParticleResult<EmissionController<B>>
    where
        C: TextureCatalog<B::Texture> + ?Sized,
    {
        settings.owned_particles = self.config.clamp_capacity(settings.owned_particles);
        create_controller_with_fallback(
            &mut self.manager,
            catalog,
            settings,
            &self.config.default_texture,
        )
    }

    pub fn manager_mut(&mut self) -> &mut EmitterManager<B> {
        &mut self.manager
    }

    /// Simulate one frame
    pub fn update(&mut self, delta_seconds: f32) -> FrameStats {
        self.last_stats = self.scheduler.update(&mut self.manager, delta_seconds);
        self.last_stats
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Live emitters with at least one alive particle
    pub fn render_info(&self) -> Vec<EmitterRenderInfo> {
        self.manager
            .emitters()
            .iter()
            .filter_map(|entry| entry.upgrade())
            .filter_map(|shared| {
                let emitter = shared.lock();
                if emitter.alive_count == 0 {
                    return None;
                }
                Some(EmitterRenderInfo {
                    id: emitter.id,
                    alive_count: emitter.alive_count,
                    capacity: emitter.capacity,
                    position: emitter.position,
                    main_texture: emitter.main_texture.as_ref().map(|t| t.name.clone()),
                })
            })
            .collect()
    }

    /// Visit the front buffer of every non-empty emitter in registry order
    pub fn for_each_render_batch<F>(&self, mut f: F)
    where
        F: FnMut(RenderBatch<'_, B>),
    {
        for entry in self.manager.emitters() {
            let Some(emitter) = entry.upgrade() else {
                continue;
            };
            let emitter = emitter.lock();
            if emitter.alive_count == 0 {
                continue;
            }
            f(RenderBatch {
                id: emitter.id,
                alive_count: emitter.alive_count,
                particles: front_buffer(&emitter.pool),
                main_texture: emitter.main_texture.as_ref(),
            });
        }
    }
}
