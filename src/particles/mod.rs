//! Particles Module - GPU-driven particle simulation core

pub mod color_gradient;
pub mod emitter_data;
pub mod emitter_manager;
pub mod emitter_operations;
pub mod particle_data;
pub mod particle_operations;
pub mod simulation_scheduler;

pub use color_gradient::{ColorGradient, ColorMark};
pub use emitter_data::{EmitterData, EmitterId, SharedEmitter, TextureRef};
pub use emitter_manager::EmitterManager;
pub use particle_data::{GpuParticle, SpawnRequest};
pub use simulation_scheduler::{FrameStats, SimulationScheduler};
