//! Host-memory reference backend
//!
//! Runs the simulation kernel and the alive/dead partition on the CPU with the
//! exact semantics of the WGSL kernels. Used for headless runs, small pools
//! and tests.

use super::backend::{check_alignment, ComputeBackend, GpuError, KernelSource, SimulationBindings};
use crate::particles::particle_data::{
    EmitterParams, GlobalParams, GpuColorMark, GpuParticle, COLOR_MARK_STRIDE, PARTICLE_STRIDE,
};
use crate::particles::particle_operations::{is_expired, step_particle};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

const WORDS_PER_PARTICLE: usize = (PARTICLE_STRIDE / 4) as usize;

/// Buffer backed by 32-bit words so particle slices can be viewed in place
pub struct CpuBuffer {
    label: String,
    words: RwLock<Vec<u32>>,
}

impl CpuBuffer {
    fn new(label: &str, size: u64) -> Self {
        let words = size.div_ceil(4) as usize;
        Self {
            label: label.to_string(),
            words: RwLock::new(vec![0; words]),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.words.read().len() as u64 * 4
    }

    /// Debug readback of the first `count` particle slots
    pub fn read_particles(&self, count: u32) -> Vec<GpuParticle> {
        let words = self.words.read();
        let end = (count as usize * WORDS_PER_PARTICLE).min(words.len());
        let whole = end - end % WORDS_PER_PARTICLE;
        bytemuck::cast_slice::<u32, GpuParticle>(&words[..whole]).to_vec()
    }

    pub(crate) fn read_pod<T: bytemuck::Pod>(&self) -> Result<T, GpuError> {
        let words = self.words.read();
        let bytes: &[u8] = bytemuck::cast_slice(&words[..]);
        let size = std::mem::size_of::<T>();
        if bytes.len() < size {
            return Err(GpuError::DispatchFailed {
                work_items: 0,
                reason: format!("'{}' is smaller than its parameter block", self.label),
            });
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
    }
}

/// RGBA8 texture held on the host
pub struct CpuTexture {
    width: u32,
    height: u32,
    texels: Vec<[u8; 4]>,
}

impl CpuTexture {
    pub fn new(width: u32, height: u32, texels: Vec<[u8; 4]>) -> Result<Self, GpuError> {
        if width == 0 || height == 0 || texels.len() != (width * height) as usize {
            return Err(GpuError::BufferCreationFailed {
                label: "cpu texture".to_string(),
                size: texels.len() as u64 * 4,
                reason: format!("{} texels do not fill {}x{}", texels.len(), width, height),
            });
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }

    /// Alpha at a UV, nearest texel, clamped to the edges
    pub fn alpha_at(&self, uv: [f32; 2]) -> f32 {
        let x = ((uv[0] * self.width as f32) as i64).clamp(0, self.width as i64 - 1) as u32;
        let y = ((uv[1] * self.height as f32) as i64).clamp(0, self.height as i64 - 1) as u32;
        self.texels[(y * self.width + x) as usize][3] as f32 / 255.0
    }
}

/// Validated kernel handle. The kernel logic itself is `step_particle`.
pub struct CpuKernel {
    name: String,
}

impl CpuKernel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct CpuBackend {
    max_buffer_size: u64,
    dispatches: AtomicU64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_max_buffer_size(256 * 1024 * 1024)
    }

    pub fn with_max_buffer_size(max_buffer_size: u64) -> Self {
        log::info!(
            "[CpuBackend] Created with {} MB buffer limit",
            max_buffer_size / (1024 * 1024)
        );
        Self {
            max_buffer_size,
            dispatches: AtomicU64::new(0),
        }
    }

    /// Simulation dispatches issued so far
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    fn create_buffer(&self, label: &str, size: u64) -> Result<CpuBuffer, GpuError> {
        if size == 0 || size > self.max_buffer_size {
            return Err(GpuError::BufferCreationFailed {
                label: label.to_string(),
                size,
                reason: format!("size must be in 1..={}", self.max_buffer_size),
            });
        }
        Ok(CpuBuffer::new(label, size))
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Texture = CpuTexture;
    type Kernel = CpuKernel;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_storage_buffer(&self, label: &str, size: u64) -> Result<CpuBuffer, GpuError> {
        self.create_buffer(label, size)
    }

    fn create_uniform_buffer(&self, label: &str, size: u64) -> Result<CpuBuffer, GpuError> {
        self.create_buffer(label, size)
    }

    fn write_buffer(&self, buffer: &CpuBuffer, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        check_alignment(offset, data.len() as u64)?;

        let mut words = buffer.words.write();
        let size = words.len() as u64 * 4;
        if offset + data.len() as u64 > size {
            return Err(GpuError::WriteOutOfBounds {
                label: buffer.label.clone(),
                offset,
                len: data.len() as u64,
                size,
            });
        }

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words[..]);
        bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn load_kernel(&self, source: &KernelSource) -> Result<CpuKernel, GpuError> {
        source.load_validated()?;
        log::info!("[CpuBackend] Loaded kernel '{}'", source.name());
        Ok(CpuKernel {
            name: source.name(),
        })
    }

    fn dispatch_simulation(
        &self,
        _kernel: &CpuKernel,
        bindings: &SimulationBindings<'_, Self>,
        work_items: u32,
    ) -> Result<(), GpuError> {
        if std::ptr::eq(bindings.particles_in, bindings.particles_out) {
            return Err(GpuError::DispatchFailed {
                work_items,
                reason: "input and output particle buffers alias".to_string(),
            });
        }

        let global: GlobalParams = bindings.global_params.read_pod()?;
        let emitter: EmitterParams = bindings.emitter_params.read_pod()?;

        let gradient_words = bindings.color_gradient.words.read();
        let whole_marks = gradient_words.len() / (COLOR_MARK_STRIDE / 4) as usize;
        let mark_words = whole_marks * (COLOR_MARK_STRIDE / 4) as usize;
        let gradient: &[GpuColorMark] = bytemuck::cast_slice(&gradient_words[..mark_words]);

        let input_words = bindings.particles_in.words.read();
        let mut output_words = bindings.particles_out.words.write();

        let needed = work_items as usize * WORDS_PER_PARTICLE;
        if needed > input_words.len() || needed > output_words.len() {
            return Err(GpuError::DispatchFailed {
                work_items,
                reason: format!(
                    "pool of {} slots is smaller than the dispatch",
                    input_words.len().min(output_words.len()) / WORDS_PER_PARTICLE
                ),
            });
        }

        let input: &[GpuParticle] = bytemuck::cast_slice(&input_words[..needed]);
        let output: &mut [GpuParticle] = bytemuck::cast_slice_mut(&mut output_words[..needed]);

        let dt = global.elapsed_seconds();
        for (slot, particle) in output.iter_mut().zip(input) {
            *slot = step_particle(particle, dt, &emitter, gradient, |uv| {
                bindings.shape_mask.map_or(1.0, |mask| mask.alpha_at(uv))
            });
        }

        self.dispatches.fetch_add(1, Ordering::Relaxed);
        log::trace!("[CpuBackend] Simulated {} particles", work_items);
        Ok(())
    }

    fn partition_alive_dead(
        &self,
        live: &CpuBuffer,
        scratch: &CpuBuffer,
        alive: u32,
    ) -> Result<u32, GpuError> {
        if std::ptr::eq(live, scratch) {
            return Err(GpuError::DispatchFailed {
                work_items: alive,
                reason: "partition scratch aliases the live pool".to_string(),
            });
        }

        let mut live_words = live.words.write();
        let mut scratch_words = scratch.words.write();

        let needed = alive as usize * WORDS_PER_PARTICLE;
        if needed > live_words.len() || needed > scratch_words.len() {
            return Err(GpuError::DispatchFailed {
                work_items: alive,
                reason: "partition range exceeds the pool".to_string(),
            });
        }

        let live_particles: &mut [GpuParticle] =
            bytemuck::cast_slice_mut(&mut live_words[..needed]);
        let scratch_particles: &mut [GpuParticle] =
            bytemuck::cast_slice_mut(&mut scratch_words[..needed]);

        // Same append-then-copy shape as the GPU partition kernel
        let mut survivors = 0usize;
        for particle in live_particles.iter().filter(|p| !is_expired(p)) {
            scratch_particles[survivors] = *particle;
            survivors += 1;
        }
        live_particles[..survivors].copy_from_slice(&scratch_particles[..survivors]);

        Ok(survivors as u32)
    }

    fn max_dispatch_size(&self) -> u32 {
        u32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(lifetime: f32) -> GpuParticle {
        GpuParticle {
            lifetime,
            max_lifetime: lifetime.max(1.0),
            ..Default::default()
        }
    }

    fn pool(backend: &CpuBackend, particles: &[GpuParticle]) -> CpuBuffer {
        let buffer = backend
            .create_storage_buffer("pool", particles.len() as u64 * PARTICLE_STRIDE)
            .unwrap();
        backend
            .write_buffer(&buffer, 0, bytemuck::cast_slice(particles))
            .unwrap();
        buffer
    }

    #[test]
    fn test_write_rejects_out_of_bounds_and_unaligned() {
        let backend = CpuBackend::new();
        let buffer = backend.create_uniform_buffer("params", 32).unwrap();
        assert!(backend.write_buffer(&buffer, 16, &[0; 16]).is_ok());
        assert!(matches!(
            backend.write_buffer(&buffer, 24, &[0; 16]),
            Err(GpuError::WriteOutOfBounds { .. })
        ));
        assert!(matches!(
            backend.write_buffer(&buffer, 1, &[0; 4]),
            Err(GpuError::Unaligned { .. })
        ));
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let backend = CpuBackend::new();
        assert!(backend.create_storage_buffer("empty", 0).is_err());
    }

    #[test]
    fn test_partition_keeps_only_survivors() {
        let backend = CpuBackend::new();
        let live = pool(
            &backend,
            &[particle(1.0), particle(0.0), particle(2.0), particle(0.0)],
        );
        let scratch = backend
            .create_storage_buffer("scratch", 4 * PARTICLE_STRIDE)
            .unwrap();

        let survivors = backend.partition_alive_dead(&live, &scratch, 4).unwrap();
        assert_eq!(survivors, 2);

        let mut lifetimes: Vec<f32> = live
            .read_particles(survivors)
            .iter()
            .map(|p| p.lifetime)
            .collect();
        lifetimes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(lifetimes, vec![1.0, 2.0]);
    }

    #[test]
    fn test_partition_rejects_aliased_scratch() {
        let backend = CpuBackend::new();
        let live = pool(&backend, &[particle(1.0)]);
        assert!(backend.partition_alive_dead(&live, &live, 1).is_err());
    }

    #[test]
    fn test_texture_alpha_lookup() {
        let mask = CpuTexture::new(2, 1, vec![[0, 0, 0, 0], [255, 255, 255, 255]]).unwrap();
        assert_eq!(mask.alpha_at([0.1, 0.5]), 0.0);
        assert_eq!(mask.alpha_at([0.9, 0.5]), 1.0);
        assert_eq!(mask.alpha_at([5.0, -3.0]), 1.0);
        assert!(CpuTexture::new(2, 2, vec![[0; 4]]).is_err());
    }
}
