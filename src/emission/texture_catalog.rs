//! Name-to-texture lookup used by the emission layer

use std::collections::HashMap;
use std::sync::Arc;

/// Resolves texture names to loaded device textures.
///
/// The particle core never queries this; emission controllers resolve names
/// before handing a reference to an emitter.
pub trait TextureCatalog<T> {
    fn resolve(&self, name: &str) -> Option<Arc<T>>;

    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// Simple in-memory catalog
pub struct NamedTextures<T> {
    textures: HashMap<String, Arc<T>>,
}

impl<T> NamedTextures<T> {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, texture: T) -> Arc<T> {
        let texture = Arc::new(texture);
        self.textures.insert(name.into(), Arc::clone(&texture));
        texture
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl<T> Default for NamedTextures<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TextureCatalog<T> for NamedTextures<T> {
    fn resolve(&self, name: &str) -> Option<Arc<T>> {
        self.textures.get(name).cloned()
    }
}
