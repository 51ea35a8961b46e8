//! Per-frame particle simulation
//!
//! One pass over the emitter registry per `update`: prune released emitters,
//! skip empty ones, and for the rest upload parameters, dispatch the kernel
//! over exactly the alive particles, swap buffer roles and compact.
//!
//! The two staging parameter buffers are shared by every emitter, so
//! dispatches must stay strictly sequential on one queue. Running emitters
//! on independent queues would need a staging pair per queue.

use super::emitter_data::EmitterData;
use super::emitter_manager::EmitterManager;
use super::emitter_operations::{
    back_buffer, compact, emitter_params, front_buffer, shape_mask, swap_buffers, sync_gradient,
};
use super::particle_data::{EmitterParams, GlobalParams};
use crate::error::{GpuErrorContext, ParticleResult};
use crate::gpu::{ComputeBackend, DispatchGuard, GpuError, KernelSource, SimulationBindings};
use std::sync::Arc;

/// Diagnostics of one `update` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Alive particles across dispatched emitters, counted before simulation
    pub total_alive_particles: u32,
    /// Alive particles after compaction
    pub surviving_particles: u32,
    pub dispatches: u32,
    pub skipped_empty: u32,
    pub failed: u32,
    pub pruned: u32,
}

pub struct SimulationScheduler<B: ComputeBackend> {
    backend: Arc<B>,
    /// `None` when the kernel failed to load; dispatch stays disabled
    kernel: Option<B::Kernel>,
    global_params: B::Buffer,
    emitter_params: B::Buffer,
    guard: DispatchGuard,
}

impl<B: ComputeBackend> SimulationScheduler<B> {
    /// Staging buffer failures are fatal. A kernel that fails to load is
    /// logged and leaves this scheduler unable to dispatch.
    pub fn new(backend: Arc<B>, kernel_source: &KernelSource) -> ParticleResult<Self> {
        let global_params = backend
            .create_uniform_buffer(
                "Particle Global Params",
                std::mem::size_of::<GlobalParams>() as u64,
            )
            .gpu_context("create global parameter buffer")?;
        let emitter_params = backend
            .create_uniform_buffer(
                "Particle Emitter Params",
                std::mem::size_of::<EmitterParams>() as u64,
            )
            .gpu_context("create emitter parameter buffer")?;

        let kernel = match backend.load_kernel(kernel_source) {
            Ok(kernel) => Some(kernel),
            Err(e) => {
                log::error!(
                    "[SimulationScheduler] Failed to load particle kernel, simulation disabled: {}",
                    e
                );
                None
            }
        };

        log::info!(
            "[SimulationScheduler] Initialized on '{}' backend",
            backend.name()
        );

        Ok(Self {
            backend,
            kernel,
            global_params,
            emitter_params,
            guard: DispatchGuard::default(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.kernel.is_some() && !self.guard.is_device_lost()
    }

    pub fn guard(&self) -> &DispatchGuard {
        &self.guard
    }

    /// Advance every registered emitter by `elapsed_seconds`
    pub fn update(&self, manager: &mut EmitterManager<B>, elapsed_seconds: f32) -> FrameStats {
        let mut stats = FrameStats::default();
        let global = GlobalParams::for_frame(elapsed_seconds);

        manager.emitters_mut().retain(|entry| {
            let Some(emitter) = entry.upgrade() else {
                stats.pruned += 1;
                return false;
            };
            let mut emitter = emitter.lock();

            let alive = emitter.alive_count;
            if alive == 0 {
                stats.skipped_empty += 1;
                return true;
            }
            stats.total_alive_particles = stats.total_alive_particles.saturating_add(alive);

            let Some(kernel) = self.kernel.as_ref() else {
                return true;
            };

            match self
                .guard
                .execute(|| self.step_emitter(kernel, &mut emitter, &global))
            {
                Ok(survivors) => {
                    stats.dispatches += 1;
                    stats.surviving_particles =
                        stats.surviving_particles.saturating_add(survivors);
                }
                Err(e) => {
                    stats.failed += 1;
                    log::warn!(
                        "[SimulationScheduler] Skipping emitter {} this frame: {}",
                        emitter.id.0,
                        e
                    );
                }
            }
            true
        });

        if stats.pruned > 0 {
            log::debug!(
                "[SimulationScheduler] Pruned {} released emitters",
                stats.pruned
            );
        }
        log::trace!(
            "[SimulationScheduler] Frame: {} alive, {} dispatches, {} failed",
            stats.total_alive_particles,
            stats.dispatches,
            stats.failed
        );

        stats
    }

    fn step_emitter(
        &self,
        kernel: &B::Kernel,
        emitter: &mut EmitterData<B>,
        global: &GlobalParams,
    ) -> Result<u32, GpuError> {
        sync_gradient(emitter)?;

        self.backend
            .write_buffer(&self.global_params, 0, bytemuck::bytes_of(global))?;
        self.backend.write_buffer(
            &self.emitter_params,
            0,
            bytemuck::bytes_of(&emitter_params(emitter)),
        )?;

        let bindings = SimulationBindings {
            global_params: &self.global_params,
            emitter_params: &self.emitter_params,
            particles_in: front_buffer(&emitter.pool),
            color_gradient: &emitter.gradient_buffer,
            shape_mask: shape_mask(emitter),
            particles_out: back_buffer(&emitter.pool),
        };
        self.backend
            .dispatch_simulation(kernel, &bindings, emitter.alive_count)?;

        swap_buffers(&mut emitter.pool);
        // a failed compaction keeps the kernel output; its expired slots
        // stay expired until the next successful pass
        compact(emitter)
    }
}
