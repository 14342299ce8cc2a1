//! Storage driver trait definition.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use fsabstract_common::{Error, FileDescriptor, FileLocation, Result};

/// Flat driver options, keyed as `<driver>.<option>`.
pub type DriverOptions = HashMap<String, String>;

/// Build the namespaced option key for a driver.
pub fn option_key(driver: &str, key: &str) -> String {
    format!("{}.{}", driver, key)
}

/// Look up a driver option.
pub fn option_value<'a>(options: &'a DriverOptions, driver: &str, key: &str) -> Option<&'a str> {
    options.get(&option_key(driver, key)).map(String::as_str)
}

/// Split a comma-separated option into trimmed, non-empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Load driver options from a JSON object of strings.
pub fn load_options(path: impl AsRef<Path>) -> Result<DriverOptions> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
}

/// Storage driver trait for different backends.
///
/// A driver is created unconfigured by the registry, then configured and
/// initialized once before serving any data operation. Data operations
/// take the descriptor by reference and return an updated copy; the
/// caller's value is never modified.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Registry name, also written into every location this driver creates.
    fn driver_name(&self) -> &str;

    /// Apply recognized `<driver>.<key>` options.
    ///
    /// Unrecognized keys are ignored. May be called repeatedly; the last
    /// value seen for a key wins.
    ///
    /// # Errors
    /// - Configuration error for a recognized key with an invalid value
    fn configure(&mut self, options: &DriverOptions) -> Result<()>;

    /// Prepare the backend: open connections, create directories.
    ///
    /// # Errors
    /// - Configuration error if a required option was never set
    /// - Connection error if the backend cannot be reached
    async fn initialize(&mut self) -> Result<()>;

    /// Fetch the payload of this driver's copy.
    ///
    /// # Returns
    /// The payload and the location it was read from.
    ///
    /// # Errors
    /// - Not found if the descriptor has no location for this driver, or
    ///   the backend has no object under it
    /// - Backend errors
    async fn get(&self, descriptor: &FileDescriptor) -> Result<(Vec<u8>, FileLocation)>;

    /// Store `payload` under a key derived from the descriptor id and name.
    ///
    /// # Postconditions
    /// - The returned descriptor records the new location, replacing any
    ///   previous entry for this driver, and its size matches the payload
    /// - If the previous entry named a different key in the same store,
    ///   that object has been removed
    ///
    /// # Errors
    /// - Backend errors
    async fn put(&self, descriptor: &FileDescriptor, payload: &[u8]) -> Result<FileDescriptor>;

    /// Remove this driver's copy.
    ///
    /// The location is re-resolved from the descriptor. When `location` is
    /// given it must match that entry.
    ///
    /// # Errors
    /// - Not found if there is no location for this driver or no object
    /// - Invalid input if `location` disagrees with the descriptor
    /// - Backend errors
    async fn delete(
        &self,
        descriptor: &FileDescriptor,
        location: Option<&FileLocation>,
    ) -> Result<FileDescriptor>;
}

/// Resolve the location a delete should act on.
///
/// Shared by all drivers so the hint is checked the same way everywhere.
pub fn resolve_delete_target<'a>(
    descriptor: &'a FileDescriptor,
    driver: &str,
    hint: Option<&FileLocation>,
) -> Result<&'a FileLocation> {
    let current = descriptor.require_location(driver)?;
    if let Some(hint) = hint {
        if hint != current {
            return Err(Error::InvalidInput(format!(
                "Location '{}' does not match '{}' recorded for driver '{}'",
                hint.location, current.location, driver
            )));
        }
    }
    Ok(current)
}

/// The entry a put under `key` will replace, when it names another object
/// in the same store.
///
/// Drivers remove that object once the new write succeeds; otherwise a
/// renamed descriptor would leave it unreachable.
pub fn superseded_location<'a>(
    descriptor: &'a FileDescriptor,
    driver: &str,
    store_id: &str,
    key: &str,
) -> Option<&'a FileLocation> {
    descriptor
        .location_for_driver(driver)
        .filter(|l| l.store_id == store_id && l.location != key)
}

/// Build the descriptor returned by a successful put.
pub fn stored_descriptor(
    descriptor: &FileDescriptor,
    location: FileLocation,
    payload: &[u8],
) -> FileDescriptor {
    let mut updated = descriptor.with_location(location);
    updated.size = payload.len() as u64;
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_lookup() {
        let mut options = DriverOptions::new();
        options.insert("local.basepath".to_string(), "/tmp/x".to_string());

        assert_eq!(option_value(&options, "local", "basepath"), Some("/tmp/x"));
        assert_eq!(option_value(&options, "memory", "basepath"), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" a:1 , b:2,,c:3 "),
            vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_load_options() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("options.json");
        std::fs::write(&path, r#"{"local.basepath": "/srv/files"}"#).unwrap();

        let options = load_options(&path).unwrap();
        assert_eq!(options["local.basepath"], "/srv/files");

        std::fs::write(&path, r#"{"local.basepath": 3}"#).unwrap();
        assert!(matches!(load_options(&path), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_resolve_delete_target_hint() {
        let loc = FileLocation::new("", "local", "fs_1_a");
        let desc = FileDescriptor::new(1, "a").with_location(loc.clone());

        assert_eq!(resolve_delete_target(&desc, "local", None).unwrap(), &loc);
        assert_eq!(resolve_delete_target(&desc, "local", Some(&loc)).unwrap(), &loc);

        let stale = FileLocation::new("", "local", "fs_2_b");
        assert!(matches!(
            resolve_delete_target(&desc, "local", Some(&stale)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            resolve_delete_target(&desc, "memory", None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_superseded_location() {
        let loc = FileLocation::new("bucket", "s3", "fs_1_a");
        let desc = FileDescriptor::new(1, "b").with_location(loc.clone());

        assert_eq!(superseded_location(&desc, "s3", "bucket", "fs_1_b"), Some(&loc));
        assert_eq!(superseded_location(&desc, "s3", "bucket", "fs_1_a"), None);
        assert_eq!(superseded_location(&desc, "s3", "other", "fs_1_b"), None);
        assert_eq!(superseded_location(&desc, "local", "", "fs_1_b"), None);
    }
}
