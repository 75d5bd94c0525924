//! Named, reference-counted resource cache.
//!
//! Resources are loaded once through a caller-supplied loader and handed out
//! as `Arc<T>`. Removal is refused while any handle other than the cache's
//! own is alive, so a resource never disappears under a user.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

/// Per-cache sequential identifier; the first loaded resource gets 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u64);

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("name collision: resource `{0}` is already loaded")]
    NameCollision(String),
    #[error("resource `{0}` not found")]
    NotFound(String),
    #[error("cannot remove resource `{name}` in use ({users} outstanding handles)")]
    InUse { name: String, users: usize },
    #[error("failed to load `{path}`: {message}")]
    Load { path: String, message: String },
}

struct Entry<T> {
    id: ResourceId,
    resource: Arc<T>,
}

pub struct ResourceCache<T> {
    entries: HashMap<String, Entry<T>>,
    next_id: u64,
}

impl<T> Default for ResourceCache<T> {
    fn default() -> Self {
        Self { entries: HashMap::new(), next_id: 1 }
    }
}

impl<T> ResourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` under `name` (the path itself when `name` is empty).
    /// The loader is not invoked when the name is already taken.
    pub fn load<F, E>(&mut self, loader: F, path: &Path, name: &str) -> Result<(ResourceId, Arc<T>), ResourceError>
    where
        F: FnOnce(&Path) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let key = if name.is_empty() { path.to_string_lossy().into_owned() } else { name.to_string() };
        if self.entries.contains_key(&key) {
            return Err(ResourceError::NameCollision(key));
        }
        let resource = loader(path).map_err(|e| ResourceError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(self.insert_named(key, resource))
    }

    /// Inserts an already-built resource.
    pub fn insert(&mut self, name: &str, resource: T) -> Result<(ResourceId, Arc<T>), ResourceError> {
        if self.entries.contains_key(name) {
            return Err(ResourceError::NameCollision(name.to_string()));
        }
        Ok(self.insert_named(name.to_string(), resource))
    }

    fn insert_named(&mut self, key: String, resource: T) -> (ResourceId, Arc<T>) {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        let resource = Arc::new(resource);
        log::debug!("resource cache: loaded `{}` as {:?}", key, id);
        self.entries.insert(key, Entry { id, resource: Arc::clone(&resource) });
        (id, resource)
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, ResourceError> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.resource))
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }

    pub fn id_of(&self, name: &str) -> Option<ResourceId> {
        self.entries.get(name).map(|e| e.id)
    }

    /// Drops the cache's handle. Fails while other handles exist.
    pub fn remove(&mut self, name: &str) -> Result<(), ResourceError> {
        let entry = self.entries.get(name).ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        let users = Arc::strong_count(&entry.resource);
        if users > 1 {
            return Err(ResourceError::InUse { name: name.to_string(), users: users - 1 });
        }
        self.entries.remove(name);
        log::debug!("resource cache: removed `{}`", name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
