//! In-memory storage driver.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::driver::{
    option_value, resolve_delete_target, stored_descriptor, superseded_location, DriverOptions,
    StorageDriver,
};
use fsabstract_common::{derive_key, Error, FileDescriptor, FileLocation, Result};

/// Registry name of the memory driver.
pub const MEMORY_DRIVER: &str = "memory";

/// Shared backing map for memory drivers.
///
/// Cloning yields a handle to the same data, so several driver instances
/// behave like clients of one cache server.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> Result<usize> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::Backend("Memory store lock poisoned".to_string()))?;
        Ok(objects.len())
    }

    /// Check if empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::Backend("Memory store lock poisoned".to_string()))?;
        Ok(objects.get(key).cloned())
    }

    fn write(&self, key: String, data: Vec<u8>) -> Result<()> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Error::Backend("Memory store lock poisoned".to_string()))?;
        objects.insert(key, data);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Error::Backend("Memory store lock poisoned".to_string()))?;
        Ok(objects.remove(key).is_some())
    }
}

/// In-memory storage driver.
///
/// Useful for testing and as a volatile cache tier. Data lives only as
/// long as the backing [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryDriver {
    store: MemoryStore,
    store_id: String,
    initialized: bool,
}

impl MemoryDriver {
    /// Create a driver with its own private store.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Create a driver over a shared store.
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store,
            store_id: String::new(),
            initialized: false,
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized(MEMORY_DRIVER.to_string()))
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn driver_name(&self) -> &str {
        MEMORY_DRIVER
    }

    fn configure(&mut self, options: &DriverOptions) -> Result<()> {
        if let Some(store_id) = option_value(options, MEMORY_DRIVER, "store") {
            self.store_id = store_id.to_string();
        }
        Ok(())
    }

    async fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    async fn get(&self, descriptor: &FileDescriptor) -> Result<(Vec<u8>, FileLocation)> {
        self.ensure_initialized()?;
        let location = descriptor.require_location(MEMORY_DRIVER)?;

        match self.store.read(&location.location)? {
            Some(data) => Ok((data, location.clone())),
            None => Err(Error::NotFound(format!(
                "Object not found: {}",
                location.location
            ))),
        }
    }

    async fn put(&self, descriptor: &FileDescriptor, payload: &[u8]) -> Result<FileDescriptor> {
        self.ensure_initialized()?;
        let key = derive_key(descriptor.id, &descriptor.name);

        self.store.write(key.clone(), payload.to_vec())?;
        if let Some(old) = superseded_location(descriptor, MEMORY_DRIVER, &self.store_id, &key) {
            self.store.remove(&old.location)?;
        }

        debug!("Cached {} bytes for file {}", payload.len(), descriptor.id);
        let location = FileLocation::new(self.store_id.clone(), MEMORY_DRIVER, key);
        Ok(stored_descriptor(descriptor, location, payload))
    }

    async fn delete(
        &self,
        descriptor: &FileDescriptor,
        location: Option<&FileLocation>,
    ) -> Result<FileDescriptor> {
        self.ensure_initialized()?;
        let current = resolve_delete_target(descriptor, MEMORY_DRIVER, location)?;

        if !self.store.remove(&current.location)? {
            return Err(Error::NotFound(format!(
                "Object not found: {}",
                current.location
            )));
        }

        Ok(descriptor.without_location(current))
    }
}
