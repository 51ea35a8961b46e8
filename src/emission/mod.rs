//! Emission Module - caller-side glue that turns authoring settings into
//! spawn requests

pub mod emission_data;
pub mod emission_operations;
pub mod texture_catalog;

pub use emission_data::{EmissionController, EmissionSettings, EmitterTransform};
pub use texture_catalog::{NamedTextures, TextureCatalog};
