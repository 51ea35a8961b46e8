//! wgpu compute backend
//!
//! Each dispatch is recorded into its own encoder and submitted before the
//! call returns. Parameter uploads go through `Queue::write_buffer`, which is
//! ordered against submissions on the same queue, so the next emitter's
//! parameter write can never land under a previous emitter's dispatch.

use super::backend::{
    check_alignment, ComputeBackend, GpuError, KernelSource, SimulationBindings,
    PARTICLE_TYPES_WGSL, PARTITION_KERNEL_WGSL, SIMULATION_ENTRY_POINT,
};
use super::binding_manager::{
    assemble_simulation_source, simulation, simulation_registry, BindingRegistry,
};
use crate::particles::particle_data::{GpuParticle, PARTICLE_STRIDE};
use std::sync::Arc;
use wgpu::{BindGroupLayout, Buffer, BufferUsages, ComputePipeline, Device, PipelineLayout, Queue};

/// Sampled RGBA8 texture and the view bound to the kernel
pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub struct WgpuKernel {
    pipeline: ComputePipeline,
    name: String,
}

impl WgpuKernel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct WgpuBackend {
    device: Arc<Device>,
    queue: Arc<Queue>,
    registry: BindingRegistry,
    simulation_layout: BindGroupLayout,
    simulation_pipeline_layout: PipelineLayout,
    partition_pipeline: ComputePipeline,
    /// Survivor counter written by the partition kernel
    survivor_counter: Buffer,
    survivor_readback: Buffer,
    partition_params: Buffer,
    /// Bound in place of a shape texture that is not loaded
    fallback_mask: WgpuTexture,
}

impl WgpuBackend {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>) -> Result<Self, GpuError> {
        let registry = simulation_registry();
        let simulation_layout =
            registry.create_bind_group_layout(&device, 0, Some("Particle Simulation Layout"));
        let simulation_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Particle Simulation Pipeline Layout"),
                bind_group_layouts: &[&simulation_layout],
                push_constant_ranges: &[],
            });

        let partition_source = format!("{}\n{}", PARTICLE_TYPES_WGSL, PARTITION_KERNEL_WGSL);
        let (partition_pipeline, error) = scoped(&device, || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Particle Partition Shader"),
                source: wgpu::ShaderSource::Wgsl(partition_source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Particle Partition Pipeline"),
                layout: None,
                module: &module,
                entry_point: "partition_alive_dead",
            })
        });
        if let Some(e) = error {
            return Err(GpuError::KernelLoad {
                name: "particle_partition".to_string(),
                reason: e.to_string(),
            });
        }

        let survivor_counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Survivor Counter"),
            size: 4,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let survivor_readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Survivor Readback"),
            size: 4,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let partition_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Partition Params"),
            size: 16,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let fallback_mask = create_rgba8_texture(
            &device,
            &queue,
            "Particle Fallback Shape Mask",
            1,
            1,
            &[255, 255, 255, 255],
        );

        log::info!(
            "[WgpuBackend] Initialized (max dispatch {})",
            device.limits().max_compute_workgroups_per_dimension
        );

        Ok(Self {
            device,
            queue,
            registry,
            simulation_layout,
            simulation_pipeline_layout,
            partition_pipeline,
            survivor_counter,
            survivor_readback,
            partition_params,
            fallback_mask,
        })
    }

    /// Open a device with no surface, for offline simulation and tests
    pub fn request_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GpuError::AdapterUnavailable("no adapter offered".to_string()))?;

        log::info!("[WgpuBackend] Using adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Particle Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| GpuError::AdapterUnavailable(e.to_string()))?;

        Self::new(Arc::new(device), Arc::new(queue))
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Upload an RGBA8 image usable as a main or shape texture
    pub fn create_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<WgpuTexture, GpuError> {
        if width == 0 || height == 0 || rgba.len() != (width * height * 4) as usize {
            return Err(GpuError::BufferCreationFailed {
                label: label.to_string(),
                size: rgba.len() as u64,
                reason: format!("{} bytes do not fill {}x{} RGBA8", rgba.len(), width, height),
            });
        }

        let (texture, error) = scoped(&self.device, || {
            create_rgba8_texture(&self.device, &self.queue, label, width, height, rgba)
        });
        match error {
            Some(e) => Err(GpuError::BufferCreationFailed {
                label: label.to_string(),
                size: rgba.len() as u64,
                reason: e.to_string(),
            }),
            None => Ok(texture),
        }
    }

    /// Debug readback of the first `count` particle slots. Blocks on the device.
    pub fn read_particles(&self, buffer: &Buffer, count: u32) -> Result<Vec<GpuParticle>, GpuError> {
        let size = (count as u64 * PARTICLE_STRIDE).min(buffer.size());
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Debug Readback"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Debug Readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        self.map_blocking(&staging)?;
        let particles = {
            let data = staging.slice(..).get_mapped_range();
            bytemuck::cast_slice::<u8, GpuParticle>(&data).to_vec()
        };
        staging.unmap();
        Ok(particles)
    }

    fn map_blocking(&self, buffer: &Buffer) -> Result<(), GpuError> {
        let (sender, receiver) = flume::bounded(1);
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });

        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| GpuError::DeviceLost)?
            .map_err(|e| GpuError::Readback(e.to_string()))
    }

    fn create_buffer(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsages,
    ) -> Result<Buffer, GpuError> {
        let max = self.device.limits().max_buffer_size;
        if size == 0 || size > max {
            return Err(GpuError::BufferCreationFailed {
                label: label.to_string(),
                size,
                reason: format!("size must be in 1..={}", max),
            });
        }

        let (buffer, error) = scoped(&self.device, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        });
        match error {
            Some(e) => Err(GpuError::BufferCreationFailed {
                label: label.to_string(),
                size,
                reason: e.to_string(),
            }),
            None => Ok(buffer),
        }
    }

    fn binding(&self, name: &str) -> Result<u32, GpuError> {
        self.registry
            .binding_index(0, name)
            .ok_or_else(|| GpuError::DispatchFailed {
                work_items: 0,
                reason: format!("binding '{}' is not registered", name),
            })
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = Buffer;
    type Texture = WgpuTexture;
    type Kernel = WgpuKernel;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_storage_buffer(&self, label: &str, size: u64) -> Result<Buffer, GpuError> {
        self.create_buffer(
            label,
            size,
            BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        )
    }

    fn create_uniform_buffer(&self, label: &str, size: u64) -> Result<Buffer, GpuError> {
        self.create_buffer(label, size, BufferUsages::UNIFORM | BufferUsages::COPY_DST)
    }

    fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        check_alignment(offset, data.len() as u64)?;
        if offset + data.len() as u64 > buffer.size() {
            return Err(GpuError::WriteOutOfBounds {
                label: "wgpu buffer".to_string(),
                offset,
                len: data.len() as u64,
                size: buffer.size(),
            });
        }
        if !data.is_empty() {
            self.queue.write_buffer(buffer, offset, data);
        }
        Ok(())
    }

    fn load_kernel(&self, source: &KernelSource) -> Result<WgpuKernel, GpuError> {
        let body = source.load_validated()?;
        let wgsl = assemble_simulation_source(&self.registry, &body);
        let name = source.name();

        let (pipeline, error) = scoped(&self.device, || {
            let module = self
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Particle Simulation Shader"),
                    source: wgpu::ShaderSource::Wgsl(wgsl.into()),
                });
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Particle Simulation Pipeline"),
                    layout: Some(&self.simulation_pipeline_layout),
                    module: &module,
                    entry_point: SIMULATION_ENTRY_POINT,
                })
        });

        if let Some(e) = error {
            return Err(GpuError::KernelLoad {
                name,
                reason: e.to_string(),
            });
        }

        log::info!("[WgpuBackend] Loaded kernel '{}'", name);
        Ok(WgpuKernel { pipeline, name })
    }

    fn dispatch_simulation(
        &self,
        kernel: &WgpuKernel,
        bindings: &SimulationBindings<'_, Self>,
        work_items: u32,
    ) -> Result<(), GpuError> {
        let limit = self.max_dispatch_size();
        if work_items > limit {
            return Err(GpuError::DispatchTooLarge { work_items, limit });
        }
        if std::ptr::eq(bindings.particles_in, bindings.particles_out) {
            return Err(GpuError::DispatchFailed {
                work_items,
                reason: "input and output particle buffers alias".to_string(),
            });
        }

        let mask = bindings
            .shape_mask
            .map_or(&self.fallback_mask.view, |texture| &texture.view);

        let entries = [
            wgpu::BindGroupEntry {
                binding: self.binding(simulation::GLOBAL_PARAMS)?,
                resource: bindings.global_params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: self.binding(simulation::EMITTER_PARAMS)?,
                resource: bindings.emitter_params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: self.binding(simulation::PARTICLES_IN)?,
                resource: bindings.particles_in.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: self.binding(simulation::COLOR_GRADIENT)?,
                resource: bindings.color_gradient.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: self.binding(simulation::SHAPE_MASK)?,
                resource: wgpu::BindingResource::TextureView(mask),
            },
            wgpu::BindGroupEntry {
                binding: self.binding(simulation::PARTICLES_OUT)?,
                resource: bindings.particles_out.as_entire_binding(),
            },
        ];

        let ((), error) = scoped(&self.device, || {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Particle Simulation Bind Group"),
                layout: &self.simulation_layout,
                entries: &entries,
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Particle Simulation"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Particle Simulation Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&kernel.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(work_items, 1, 1);
            }
            self.queue.submit(Some(encoder.finish()));
            // bind group dropped here; nothing stays bound past this call
        });

        match error {
            Some(e) => Err(GpuError::DispatchFailed {
                work_items,
                reason: e.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn partition_alive_dead(
        &self,
        live: &Buffer,
        scratch: &Buffer,
        alive: u32,
    ) -> Result<u32, GpuError> {
        if alive == 0 {
            return Ok(0);
        }
        let limit = self.max_dispatch_size();
        if alive > limit {
            return Err(GpuError::DispatchTooLarge {
                work_items: alive,
                limit,
            });
        }
        if std::ptr::eq(live, scratch) {
            return Err(GpuError::DispatchFailed {
                work_items: alive,
                reason: "partition scratch aliases the live pool".to_string(),
            });
        }

        self.queue
            .write_buffer(&self.survivor_counter, 0, bytemuck::bytes_of(&0u32));
        self.queue.write_buffer(
            &self.partition_params,
            0,
            bytemuck::cast_slice(&[alive, 0, 0, 0]),
        );

        let ((), error) = scoped(&self.device, || {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Particle Partition Bind Group"),
                layout: &self.partition_pipeline.get_bind_group_layout(0),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: live.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: scratch.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.survivor_counter.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.partition_params.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Particle Partition"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Particle Partition Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.partition_pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(alive, 1, 1);
            }

            encoder.copy_buffer_to_buffer(&self.survivor_counter, 0, &self.survivor_readback, 0, 4);
            self.queue.submit(Some(encoder.finish()));
        });

        if let Some(e) = error {
            return Err(GpuError::DispatchFailed {
                work_items: alive,
                reason: e.to_string(),
            });
        }

        self.map_blocking(&self.survivor_readback)?;
        let survivors = {
            let data = self.survivor_readback.slice(..).get_mapped_range();
            bytemuck::pod_read_unaligned::<u32>(&data[..4])
        };
        self.survivor_readback.unmap();
        let survivors = survivors.min(alive);

        // `live` is only overwritten once the count is known; a failed
        // readback leaves the kernel output with its expired slots flagged
        if survivors > 0 {
            let ((), error) = scoped(&self.device, || {
                let mut encoder = self
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("Particle Survivor Copy"),
                    });
                encoder.copy_buffer_to_buffer(
                    scratch,
                    0,
                    live,
                    0,
                    survivors as u64 * PARTICLE_STRIDE,
                );
                self.queue.submit(Some(encoder.finish()));
            });
            if let Some(e) = error {
                return Err(GpuError::DispatchFailed {
                    work_items: survivors,
                    reason: e.to_string(),
                });
            }
        }

        Ok(survivors)
    }

    fn max_dispatch_size(&self) -> u32 {
        self.device.limits().max_compute_workgroups_per_dimension
    }
}

/// Run `f` inside validation and out-of-memory error scopes
fn scoped<T>(device: &Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, validation.or(out_of_memory))
}

fn create_rgba8_texture(
    device: &Device,
    queue: &Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> WgpuTexture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    WgpuTexture { texture, view }
}
