// Hearth Particles - GPU-driven particle simulation core
//
// Data-Oriented layout, same as the rest of Hearth:
// - *_data modules hold plain data
// - *_operations modules hold the functions that transform it
//
// Frame flow: callers spawn into emitters between frames, then
// `ParticleEngine::update` runs one simulation pass over every live emitter.

// Constants module
pub mod constants;

// Core modules
pub mod config;
pub mod engine;
pub mod error;

// Simulation core
pub mod emission;
pub mod particles;

// Device seam and backends
pub mod gpu;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ParticleEngineConfig;
pub use engine::{EmitterRenderInfo, ParticleEngine, RenderBatch};
pub use error::{GpuErrorContext, ParticleError, ParticleResult};

// === Simulation Types ===
pub use emission::{
    EmissionController, EmissionSettings, EmitterTransform, NamedTextures, TextureCatalog,
};
pub use particles::{
    ColorGradient, ColorMark, EmitterData, EmitterId, EmitterManager, FrameStats, GpuParticle,
    SharedEmitter, SimulationScheduler, SpawnRequest, TextureRef,
};

// === Backends ===
pub use gpu::{
    ComputeBackend, CpuBackend, CpuTexture, DispatchGuard, GpuError, KernelSource, WgpuBackend,
    WgpuTexture,
};
