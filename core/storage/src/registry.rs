//! Driver registry for name-based driver resolution.

use std::collections::HashMap;
use tracing::warn;

use crate::driver::{DriverOptions, StorageDriver};
use crate::memory::{MemoryDriver, MemoryStore};
use fsabstract_common::{Error, Result};

/// Factory function type producing a fresh, unconfigured driver.
pub type DriverFactory = Box<dyn Fn() -> Box<dyn StorageDriver> + Send + Sync>;

/// Wrap a constructor as a [`DriverFactory`].
pub fn driver_factory<D, F>(make: F) -> DriverFactory
where
    D: StorageDriver + 'static,
    F: Fn() -> D + Send + Sync + 'static,
{
    Box::new(move || Box::new(make()) as Box<dyn StorageDriver>)
}

/// Registry of storage driver factories.
///
/// Built once at startup and passed to whatever needs to resolve drivers.
/// Every resolution constructs a new instance, so callers configuring
/// different option sets never share state.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory under the name its drivers report.
    ///
    /// The registry name is taken from [`StorageDriver::driver_name`] so it
    /// always matches the `driver` field of the locations those drivers
    /// write. A name that is already registered is overwritten; the
    /// collision is logged and reported through the return value.
    ///
    /// # Returns
    /// `true` if a previous registration was replaced.
    pub fn register(&mut self, factory: DriverFactory) -> bool {
        let name = factory().driver_name().trim().to_string();
        let replaced = self.factories.insert(name.clone(), factory).is_some();
        if replaced {
            warn!("Driver '{}' registered twice, keeping the latest", name);
        }
        replaced
    }

    /// Resolve a fresh, unconfigured driver by name.
    ///
    /// Surrounding whitespace in `name` is ignored.
    ///
    /// # Errors
    /// - Unknown driver if nothing is registered under `name`
    pub fn resolve(&self, name: &str) -> Result<Box<dyn StorageDriver>> {
        let name = name.trim();
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownDriver(format!("Driver '{}' is not registered", name)))?;
        Ok(factory())
    }

    /// Resolve, configure and initialize a driver.
    ///
    /// # Errors
    /// - Unknown driver
    /// - Configuration or connection errors from the driver
    pub async fn open(&self, name: &str, options: &DriverOptions) -> Result<Box<dyn StorageDriver>> {
        let mut driver = self.resolve(name)?;
        driver.configure(options)?;
        driver.initialize().await?;
        Ok(driver)
    }

    /// Get the sorted list of registered driver names.
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a driver is registered.
    pub fn has_driver(&self, name: &str) -> bool {
        self.factories.contains_key(name.trim())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with every compiled-in driver.
///
/// Memory drivers resolved from the returned registry share one store.
pub fn create_default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();

    registry.register(driver_factory(crate::local::LocalDriver::new));

    let store = MemoryStore::new();
    registry.register(driver_factory(move || MemoryDriver::with_store(store.clone())));

    #[cfg(feature = "redis")]
    registry.register(driver_factory(crate::redis_kv::RedisDriver::new));

    #[cfg(feature = "s3")]
    registry.register(driver_factory(crate::s3::S3Driver::new));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalDriver;
    use fsabstract_common::{FileDescriptor, FileLocation};

    #[test]
    fn test_register_and_resolve() {
        let mut registry = DriverRegistry::new();
        registry.register(driver_factory(MemoryDriver::new));

        let driver = registry.resolve("memory").unwrap();
        assert_eq!(driver.driver_name(), "memory");
        assert!(registry.resolve(" memory ").is_ok());
    }

    /// Driver whose reported name carries stray whitespace.
    struct PaddedName(LocalDriver);

    #[async_trait::async_trait]
    impl StorageDriver for PaddedName {
        fn driver_name(&self) -> &str {
            " padded "
        }

        fn configure(&mut self, options: &DriverOptions) -> Result<()> {
            self.0.configure(options)
        }

        async fn initialize(&mut self) -> Result<()> {
            self.0.initialize().await
        }

        async fn get(&self, descriptor: &FileDescriptor) -> Result<(Vec<u8>, FileLocation)> {
            self.0.get(descriptor).await
        }

        async fn put(&self, descriptor: &FileDescriptor, payload: &[u8]) -> Result<FileDescriptor> {
            self.0.put(descriptor, payload).await
        }

        async fn delete(
            &self,
            descriptor: &FileDescriptor,
            location: Option<&FileLocation>,
        ) -> Result<FileDescriptor> {
            self.0.delete(descriptor, location).await
        }
    }

    #[test]
    fn test_registered_name_is_trimmed() {
        let mut registry = DriverRegistry::new();
        registry.register(driver_factory(|| PaddedName(LocalDriver::new())));

        assert_eq!(registry.drivers(), vec!["padded".to_string()]);
        assert!(registry.resolve(" padded ").is_ok());
        assert!(registry.has_driver("padded"));
    }

    #[test]
    fn test_registry_names_match_driver_names() {
        let registry = create_default_registry();
        for name in registry.drivers() {
            assert_eq!(registry.resolve(&name).unwrap().driver_name(), name);
        }
    }

    #[test]
    fn test_resolve_trims_name() {
        let registry = create_default_registry();
        let driver = registry.resolve("  local\n").unwrap();
        assert_eq!(driver.driver_name(), "local");
    }

    #[tokio::test]
    async fn test_duplicate_registration_last_wins() {
        let mut registry = DriverRegistry::new();

        let first = MemoryStore::new();
        let second = MemoryStore::new();
        let (a, b) = (first.clone(), second.clone());

        assert!(!registry.register(driver_factory(move || MemoryDriver::with_store(a.clone()))));
        assert!(registry.register(driver_factory(move || MemoryDriver::with_store(b.clone()))));

        let mut driver = registry.resolve("memory").unwrap();
        driver.initialize().await.unwrap();
        driver.put(&FileDescriptor::new(1, "a"), b"x").await.unwrap();

        assert!(first.is_empty().unwrap());
        assert_eq!(second.len().unwrap(), 1);
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = DriverRegistry::new();
        let result = registry.resolve("unknown");
        assert!(matches!(result, Err(Error::UnknownDriver(_))));
    }

    #[test]
    fn test_drivers_list() {
        let registry = create_default_registry();
        let drivers = registry.drivers();

        assert!(drivers.contains(&"local".to_string()));
        assert!(drivers.contains(&"memory".to_string()));
        assert!(registry.has_driver("memory"));
        assert!(!registry.has_driver("dummy"));
    }

    #[tokio::test]
    async fn test_open_fails_on_missing_configuration() {
        let registry = create_default_registry();
        let result = registry.open("local", &DriverOptions::new()).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_resolutions_are_independent() {
        let registry = create_default_registry();
        let temp = tempfile::TempDir::new().unwrap();

        let mut options = DriverOptions::new();
        options.insert(
            "local.basepath".to_string(),
            temp.path().display().to_string(),
        );
        let _configured = registry.open("local", &options).await.unwrap();

        // A second resolution starts unconfigured
        let mut fresh = registry.resolve("local").unwrap();
        assert!(matches!(
            fresh.initialize().await,
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_local_scenario_through_registry() {
        let registry = create_default_registry();
        let temp = tempfile::TempDir::new().unwrap();
        let mut options = DriverOptions::new();
        options.insert(
            "local.basepath".to_string(),
            temp.path().display().to_string(),
        );
        let driver = registry.open("local", &options).await.unwrap();

        let payload = [0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4];
        let mut desc = FileDescriptor::new(1, "a.bin");
        desc.size = 8;

        let stored = driver.put(&desc, &payload).await.unwrap();
        assert_eq!(stored.locations.len(), 1);
        assert_eq!(stored.locations[0].driver, "local");

        let (data, location) = driver.get(&stored).await.unwrap();
        assert_eq!(data, payload);

        let deleted = driver.delete(&stored, Some(&location)).await.unwrap();
        assert!(deleted.locations.is_empty());
    }
}
