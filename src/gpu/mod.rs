//! GPU Module - compute backends for the particle core

pub mod backend;
pub mod binding_manager;
pub mod cpu_backend;
pub mod error_recovery;
pub mod wgpu_backend;

pub use backend::{ComputeBackend, GpuError, KernelSource, SimulationBindings};
pub use cpu_backend::{CpuBackend, CpuBuffer, CpuKernel, CpuTexture};
pub use error_recovery::DispatchGuard;
pub use wgpu_backend::{WgpuBackend, WgpuKernel, WgpuTexture};
