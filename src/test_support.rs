//! Test doubles for the compute seam

use crate::gpu::backend::{ComputeBackend, GpuError, KernelSource, SimulationBindings};
use crate::gpu::cpu_backend::{CpuBackend, CpuBuffer, CpuKernel, CpuTexture};
use crate::particles::particle_data::EmitterParams;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// One observed simulation dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub work_items: u32,
    /// Per-emitter block as the kernel saw it
    pub emitter: EmitterParams,
    pub had_shape_mask: bool,
}

/// CPU backend that records dispatches and can be told to fail
#[derive(Default)]
pub struct RecordingBackend {
    inner: CpuBackend,
    records: Mutex<Vec<DispatchRecord>>,
    partitions: AtomicU32,
    /// Upcoming dispatches to fail
    fail_dispatches: AtomicU32,
    /// Upcoming partitions to fail after the kernel output is in place
    fail_partitions: AtomicU32,
    panic_next_dispatch: AtomicBool,
    fail_kernel_load: AtomicBool,
    /// A dispatch started while another still held its bindings
    bound: AtomicBool,
    hazards: AtomicU32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_kernel() -> Self {
        let backend = Self::default();
        backend.fail_kernel_load.store(true, Ordering::SeqCst);
        backend
    }

    pub fn dispatch_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.lock().clone()
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.load(Ordering::SeqCst)
    }

    pub fn hazard_count(&self) -> u32 {
        self.hazards.load(Ordering::SeqCst)
    }

    pub fn fail_next_dispatches(&self, count: u32) {
        self.fail_dispatches.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_partitions(&self, count: u32) {
        self.fail_partitions.store(count, Ordering::SeqCst);
    }

    pub fn panic_next_dispatch(&self) {
        self.panic_next_dispatch.store(true, Ordering::SeqCst);
    }
}

impl ComputeBackend for RecordingBackend {
    type Buffer = CpuBuffer;
    type Texture = CpuTexture;
    type Kernel = CpuKernel;

    fn name(&self) -> &'static str {
        "recording"
    }

    fn create_storage_buffer(&self, label: &str, size: u64) -> Result<CpuBuffer, GpuError> {
        self.inner.create_storage_buffer(label, size)
    }

    fn create_uniform_buffer(&self, label: &str, size: u64) -> Result<CpuBuffer, GpuError> {
        self.inner.create_uniform_buffer(label, size)
    }

    fn write_buffer(&self, buffer: &CpuBuffer, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        if self.bound.load(Ordering::SeqCst) {
            self.hazards.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.write_buffer(buffer, offset, data)
    }

    fn load_kernel(&self, source: &KernelSource) -> Result<CpuKernel, GpuError> {
        if self.fail_kernel_load.load(Ordering::SeqCst) {
            return Err(GpuError::KernelLoad {
                name: source.name(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.load_kernel(source)
    }

    fn dispatch_simulation(
        &self,
        kernel: &CpuKernel,
        bindings: &SimulationBindings<'_, Self>,
        work_items: u32,
    ) -> Result<(), GpuError> {
        if self.bound.swap(true, Ordering::SeqCst) {
            self.hazards.fetch_add(1, Ordering::SeqCst);
        }

        if self.panic_next_dispatch.swap(false, Ordering::SeqCst) {
            self.bound.store(false, Ordering::SeqCst);
            panic!("injected dispatch panic");
        }

        let result = if self
            .fail_dispatches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(GpuError::DispatchFailed {
                work_items,
                reason: "injected failure".to_string(),
            })
        } else {
            let inner_bindings = SimulationBindings::<CpuBackend> {
                global_params: bindings.global_params,
                emitter_params: bindings.emitter_params,
                particles_in: bindings.particles_in,
                color_gradient: bindings.color_gradient,
                shape_mask: bindings.shape_mask,
                particles_out: bindings.particles_out,
            };
            self.inner.dispatch_simulation(kernel, &inner_bindings, work_items)
        };

        if result.is_ok() {
            self.records.lock().push(DispatchRecord {
                work_items,
                emitter: read_emitter_params(bindings.emitter_params),
                had_shape_mask: bindings.shape_mask.is_some(),
            });
        }

        self.bound.store(false, Ordering::SeqCst);
        result
    }

    fn partition_alive_dead(
        &self,
        live: &CpuBuffer,
        scratch: &CpuBuffer,
        alive: u32,
    ) -> Result<u32, GpuError> {
        self.partitions.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_partitions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GpuError::Readback("injected failure".to_string()));
        }
        self.inner.partition_alive_dead(live, scratch, alive)
    }

    fn max_dispatch_size(&self) -> u32 {
        self.inner.max_dispatch_size()
    }
}

fn read_emitter_params(buffer: &CpuBuffer) -> EmitterParams {
    buffer.read_pod().unwrap_or_default()
}
