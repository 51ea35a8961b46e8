//! Binding index management for the particle kernels
//!
//! Bindings are registered by name and receive sequential indices per group.
//! The same registry produces the wgpu layout entries and the WGSL
//! declarations injected ahead of the kernel body, so the two cannot drift.

use std::collections::HashMap;
use wgpu::{
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    BufferBindingType, ShaderStages, TextureSampleType, TextureViewDimension,
};

/// Binding names used by the simulation kernel
pub mod simulation {
    pub const GLOBAL_PARAMS: &str = "global_params";
    pub const EMITTER_PARAMS: &str = "emitter";
    pub const PARTICLES_IN: &str = "particles_in";
    pub const COLOR_GRADIENT: &str = "color_gradient";
    pub const SHAPE_MASK: &str = "shape_mask";
    pub const PARTICLES_OUT: &str = "particles_out";
}

/// Type-safe binding key
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BindingKey {
    pub group: u32,
    pub name: String,
}

/// Binding information
#[derive(Debug, Clone)]
pub struct BindingInfo {
    pub binding: u32,
    pub ty: BindingType,
    pub visibility: ShaderStages,
    /// WGSL type of the declared variable
    pub wgsl_type: String,
}

/// Registry for one kernel's bindings
#[derive(Debug, Default)]
pub struct BindingRegistry {
    /// Map from binding key to binding info
    bindings: HashMap<BindingKey, BindingInfo>,
    /// Next available binding index per group
    next_binding: HashMap<u32, u32>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding and get its index
    pub fn register_binding(
        &mut self,
        group: u32,
        name: impl Into<String>,
        ty: BindingType,
        wgsl_type: impl Into<String>,
    ) -> u32 {
        let key = BindingKey {
            group,
            name: name.into(),
        };

        // Check if already registered
        if let Some(info) = self.bindings.get(&key) {
            return info.binding;
        }

        let binding = self.next_binding.get(&group).copied().unwrap_or(0);
        self.next_binding.insert(group, binding + 1);

        self.bindings.insert(
            key,
            BindingInfo {
                binding,
                ty,
                visibility: ShaderStages::COMPUTE,
                wgsl_type: wgsl_type.into(),
            },
        );

        binding
    }

    pub fn binding_index(&self, group: u32, name: &str) -> Option<u32> {
        self.bindings
            .get(&BindingKey {
                group,
                name: name.to_string(),
            })
            .map(|info| info.binding)
    }

    /// Get all bindings for a group
    pub fn get_group_bindings(&self, group: u32) -> Vec<BindGroupLayoutEntry> {
        let mut entries: Vec<_> = self
            .bindings
            .iter()
            .filter(|(key, _)| key.group == group)
            .map(|(_, info)| BindGroupLayoutEntry {
                binding: info.binding,
                visibility: info.visibility,
                ty: info.ty,
                count: None,
            })
            .collect();

        entries.sort_by_key(|e| e.binding);
        entries
    }

    /// Generate WGSL binding declarations for a group
    pub fn generate_wgsl_bindings(&self, group: u32) -> String {
        let mut bindings: Vec<_> = self
            .bindings
            .iter()
            .filter(|(key, _)| key.group == group)
            .collect();

        bindings.sort_by_key(|(_, info)| info.binding);

        let mut wgsl = String::new();
        for (key, info) in bindings {
            wgsl.push_str(&format!(
                "@group({}) @binding({}) var{} {}: {};\n",
                group,
                info.binding,
                binding_type_to_wgsl_qualifier(&info.ty),
                key.name,
                info.wgsl_type,
            ));
        }

        wgsl
    }

    pub fn create_bind_group_layout(
        &self,
        device: &wgpu::Device,
        group: u32,
        label: Option<&str>,
    ) -> BindGroupLayout {
        let entries = self.get_group_bindings(group);

        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label,
            entries: &entries,
        })
    }
}

/// Convert binding type to WGSL storage qualifier
fn binding_type_to_wgsl_qualifier(ty: &BindingType) -> &'static str {
    match ty {
        BindingType::Buffer { ty, .. } => match ty {
            BufferBindingType::Uniform => "<uniform>",
            BufferBindingType::Storage { read_only: true } => "<storage, read>",
            BufferBindingType::Storage { read_only: false } => "<storage, read_write>",
        },
        _ => "",
    }
}

pub fn uniform_buffer() -> BindingType {
    BindingType::Buffer {
        ty: BufferBindingType::Uniform,
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

pub fn storage_buffer(read_only: bool) -> BindingType {
    BindingType::Buffer {
        ty: BufferBindingType::Storage { read_only },
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

pub fn texture_2d() -> BindingType {
    BindingType::Texture {
        sample_type: TextureSampleType::Float { filterable: true },
        view_dimension: TextureViewDimension::D2,
        multisampled: false,
    }
}

/// Group 0 layout of the simulation kernel: parameter blocks first, then the
/// read side, then the single write target.
pub fn simulation_registry() -> BindingRegistry {
    let mut registry = BindingRegistry::new();
    registry.register_binding(0, simulation::GLOBAL_PARAMS, uniform_buffer(), "GlobalParams");
    registry.register_binding(0, simulation::EMITTER_PARAMS, uniform_buffer(), "EmitterParams");
    registry.register_binding(0, simulation::PARTICLES_IN, storage_buffer(true), "array<Particle>");
    registry.register_binding(
        0,
        simulation::COLOR_GRADIENT,
        storage_buffer(true),
        "array<ColorMark>",
    );
    registry.register_binding(0, simulation::SHAPE_MASK, texture_2d(), "texture_2d<f32>");
    registry.register_binding(
        0,
        simulation::PARTICLES_OUT,
        storage_buffer(false),
        "array<Particle>",
    );
    registry
}

/// Types, generated bindings and the kernel body, in that order
pub fn assemble_simulation_source(registry: &BindingRegistry, body: &str) -> String {
    let mut source = String::from(super::backend::PARTICLE_TYPES_WGSL);
    source.push('\n');
    source.push_str(&registry.generate_wgsl_bindings(0));
    source.push('\n');
    source.push_str(body);
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_registration() {
        let mut registry = BindingRegistry::new();

        let binding1 = registry.register_binding(0, "params", uniform_buffer(), "GlobalParams");
        let binding2 =
            registry.register_binding(0, "particles", storage_buffer(true), "array<Particle>");

        // Bindings should be sequential
        assert_eq!(binding1, 0);
        assert_eq!(binding2, 1);

        // Re-registering should return same index
        let binding1_again =
            registry.register_binding(0, "params", uniform_buffer(), "GlobalParams");
        assert_eq!(binding1_again, binding1);
    }

    #[test]
    fn test_simulation_layout_order() {
        let registry = simulation_registry();
        assert_eq!(registry.binding_index(0, simulation::GLOBAL_PARAMS), Some(0));
        assert_eq!(registry.binding_index(0, simulation::PARTICLES_OUT), Some(5));
        assert_eq!(registry.get_group_bindings(0).len(), 6);
    }

    #[test]
    fn test_wgsl_generation() {
        let registry = simulation_registry();
        let wgsl = registry.generate_wgsl_bindings(0);
        assert!(wgsl.contains("@group(0) @binding(0) var<uniform> global_params: GlobalParams;"));
        assert!(wgsl.contains(
            "@group(0) @binding(5) var<storage, read_write> particles_out: array<Particle>;"
        ));
        assert!(wgsl.contains("@group(0) @binding(4) var shape_mask: texture_2d<f32>;"));
    }

    #[test]
    fn test_assembled_source_declares_before_use() {
        let source = assemble_simulation_source(
            &simulation_registry(),
            super::super::backend::SIMULATION_KERNEL_WGSL,
        );
        let decl = source.find("var<storage, read> particles_in").unwrap();
        let entry = source.find("fn simulate_particles").unwrap();
        let types = source.find("struct Particle").unwrap();
        assert!(types < decl && decl < entry);
    }
}
