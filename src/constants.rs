//! Shared engine constants

/// Emitter pool sizing
pub mod emitter {
    /// Capacity used when a caller does not request one
    pub const DEFAULT_CAPACITY: u32 = 300;

    /// Smallest capacity the emission glue will request
    pub const MIN_CAPACITY: u32 = 2;

    /// Dispatch size equals the alive count, so a pool can never exceed the
    /// per-dimension workgroup limit guaranteed by wgpu's default limits.
    pub const MAX_CAPACITY: u32 = super::gpu_limits::MAX_WORKGROUPS_PER_DIMENSION;

    /// Gradient buffers are allocated for at least this many marks
    pub const INITIAL_GRADIENT_MARKS: u32 = 8;
}

/// Texture names known to the default asset set
pub mod textures {
    pub const DEFAULT_MAIN_TEXTURE: &str = "WhiteParticle";
    pub const DEFAULT_SHAPE_TEXTURE: &str = "BlueCircle";

    /// Fallback for BOTH the main sprite and the shape mask when a name
    /// cannot be resolved.
    pub const FALLBACK_TEXTURE: &str = DEFAULT_MAIN_TEXTURE;
}

/// GPU layout limits
pub mod gpu_limits {
    /// wgpu requires buffer copies and writes to be 4-byte aligned
    pub const COPY_ALIGNMENT: u64 = 4;

    /// Default `max_compute_workgroups_per_dimension`
    pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

    /// Alpha below which a shape-mask texel rejects a fresh particle
    pub const SHAPE_MASK_ALPHA_CUTOFF: f32 = 0.5;
}
