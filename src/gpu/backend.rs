//! Device seam between the particle core and a compute API
//!
//! Everything the emitters and the scheduler ask of the device goes through
//! `ComputeBackend`. The wgpu backend is the production path; the CPU backend
//! runs the same kernel semantics on host memory.

use std::path::PathBuf;

/// Embedded simulation kernel body (types and bindings are prepended)
pub const SIMULATION_KERNEL_WGSL: &str = include_str!("../shaders/particle_simulation.wgsl");

/// Survivor append kernel used for compaction on the device
pub const PARTITION_KERNEL_WGSL: &str = include_str!("../shaders/particle_partition.wgsl");

/// Particle layouts shared by every kernel
pub const PARTICLE_TYPES_WGSL: &str = include_str!("../shaders/particle_types.wgsl");

/// Entry point every simulation kernel must export
pub const SIMULATION_ENTRY_POINT: &str = "simulate_particles";

/// Device-level failures. Recoverable per emitter unless raised during
/// scheduler construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("Buffer creation failed for '{label}' ({size} bytes): {reason}")]
    BufferCreationFailed {
        label: String,
        size: u64,
        reason: String,
    },

    #[error("Buffer write out of bounds on '{label}': offset {offset} + {len} > {size}")]
    WriteOutOfBounds {
        label: String,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("Unaligned buffer access: offset {offset}, length {len}")]
    Unaligned { offset: u64, len: u64 },

    #[error("Kernel '{name}' failed to load: {reason}")]
    KernelLoad { name: String, reason: String },

    #[error("Dispatch of {work_items} work items failed: {reason}")]
    DispatchFailed { work_items: u32, reason: String },

    #[error("Dispatch of {work_items} work items exceeds device limit {limit}")]
    DispatchTooLarge { work_items: u32, limit: u32 },

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("No compatible GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("GPU device lost")]
    DeviceLost,

    #[error("GPU operation panicked: {message}")]
    Panic { message: String },
}

/// Where the simulation kernel comes from
#[derive(Debug, Clone, PartialEq)]
pub enum KernelSource {
    Embedded {
        name: &'static str,
        wgsl: &'static str,
    },
    File(PathBuf),
}

impl KernelSource {
    pub fn default_simulation() -> Self {
        KernelSource::Embedded {
            name: "particle_simulation",
            wgsl: SIMULATION_KERNEL_WGSL,
        }
    }

    pub fn name(&self) -> String {
        match self {
            KernelSource::Embedded { name, .. } => (*name).to_string(),
            KernelSource::File(path) => path.display().to_string(),
        }
    }

    /// Kernel body text. File sources are read on every call.
    pub fn load_text(&self) -> Result<String, GpuError> {
        match self {
            KernelSource::Embedded { wgsl, .. } => Ok((*wgsl).to_string()),
            KernelSource::File(path) => {
                std::fs::read_to_string(path).map_err(|e| GpuError::KernelLoad {
                    name: self.name(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Read the body and check it exports the simulation entry point
    pub fn load_validated(&self) -> Result<String, GpuError> {
        let text = self.load_text()?;
        if !text.contains(&format!("fn {}", SIMULATION_ENTRY_POINT)) {
            return Err(GpuError::KernelLoad {
                name: self.name(),
                reason: format!("missing entry point '{}'", SIMULATION_ENTRY_POINT),
            });
        }
        Ok(text)
    }
}

impl Default for KernelSource {
    fn default() -> Self {
        Self::default_simulation()
    }
}

/// Resources bound for one simulation dispatch
pub struct SimulationBindings<'a, B: ComputeBackend + ?Sized> {
    pub global_params: &'a B::Buffer,
    pub emitter_params: &'a B::Buffer,
    /// Front role this frame, read only
    pub particles_in: &'a B::Buffer,
    pub color_gradient: &'a B::Buffer,
    /// Shape mask, only when the emitter's texture is loaded
    pub shape_mask: Option<&'a B::Texture>,
    /// Back role this frame, written by the kernel
    pub particles_out: &'a B::Buffer,
}

/// Compute device operations used by the particle core.
///
/// Calls are issued from a single thread in emitter iteration order; an
/// implementation may rely on same-queue submission ordering and nothing else.
pub trait ComputeBackend: Send + Sync + 'static {
    type Buffer: Send + Sync + 'static;
    type Texture: Send + Sync + 'static;
    type Kernel: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Particle pools and gradient storage
    fn create_storage_buffer(&self, label: &str, size: u64) -> Result<Self::Buffer, GpuError>;

    /// Staging parameter blocks
    fn create_uniform_buffer(&self, label: &str, size: u64) -> Result<Self::Buffer, GpuError>;

    /// Host to device upload. `offset` and `data.len()` must be 4-byte aligned.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8])
        -> Result<(), GpuError>;

    fn load_kernel(&self, source: &KernelSource) -> Result<Self::Kernel, GpuError>;

    /// Bind, dispatch exactly `work_items` 1-D work groups, then release every
    /// binding before returning so the next emitter starts from a clean slate.
    fn dispatch_simulation(
        &self,
        kernel: &Self::Kernel,
        bindings: &SimulationBindings<'_, Self>,
        work_items: u32,
    ) -> Result<(), GpuError>;

    /// Move the survivors of `live[0..alive)` to `live[0..new_alive)` using
    /// `scratch` as temporary space. Survivor order is not preserved.
    ///
    /// On error `live` is left as it was; `scratch` may be clobbered.
    fn partition_alive_dead(
        &self,
        live: &Self::Buffer,
        scratch: &Self::Buffer,
        alive: u32,
    ) -> Result<u32, GpuError>;

    /// Largest `work_items` a single dispatch accepts
    fn max_dispatch_size(&self) -> u32;
}

pub(crate) fn check_alignment(offset: u64, len: u64) -> Result<(), GpuError> {
    use crate::constants::gpu_limits::COPY_ALIGNMENT;
    if offset % COPY_ALIGNMENT != 0 || len % COPY_ALIGNMENT != 0 {
        return Err(GpuError::Unaligned { offset, len });
    }
    Ok(())
}
