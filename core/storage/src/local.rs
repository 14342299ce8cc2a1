//! Local filesystem storage driver.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::driver::{
    option_value, resolve_delete_target, stored_descriptor, superseded_location, DriverOptions,
    StorageDriver,
};
use fsabstract_common::{derive_key, Error, FileDescriptor, FileLocation, Result};

/// Registry name of the local driver.
pub const LOCAL_DRIVER: &str = "local";

/// Local filesystem storage driver.
///
/// Stores every file as a single flat file under `local.basepath`, named
/// by [`derive_key`]. Locations record the file name only, so the base
/// directory can be moved without rewriting descriptors.
#[derive(Debug, Default)]
pub struct LocalDriver {
    base_path: Option<PathBuf>,
    root: Option<PathBuf>,
}

impl LocalDriver {
    /// Create an unconfigured driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver configured with `base_path`.
    pub fn with_base_path(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: Some(base_path.as_ref().to_path_buf()),
            root: None,
        }
    }

    fn root(&self) -> Result<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| Error::NotInitialized(LOCAL_DRIVER.to_string()))
    }

    /// Convert a location key to a filesystem path.
    ///
    /// Keys are single file names; anything that could escape the base
    /// directory is refused.
    fn to_fs_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(Error::InvalidInput(format!(
                "Invalid local location key: {:?}",
                key
            )));
        }
        Ok(self.root()?.join(key))
    }
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn driver_name(&self) -> &str {
        LOCAL_DRIVER
    }

    fn configure(&mut self, options: &DriverOptions) -> Result<()> {
        if let Some(path) = option_value(options, LOCAL_DRIVER, "basepath") {
            if path.trim().is_empty() {
                return Err(Error::Configuration(
                    "local.basepath cannot be empty".to_string(),
                ));
            }
            self.base_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    async fn initialize(&mut self) -> Result<()> {
        let base = self.base_path.clone().ok_or_else(|| {
            Error::Configuration("Local driver requires 'local.basepath'".to_string())
        })?;

        fs::create_dir_all(&base).await.map_err(|e| {
            Error::Connection(format!("Cannot prepare {}: {}", base.display(), e))
        })?;

        debug!("Local driver ready at {}", base.display());
        self.root = Some(base);
        Ok(())
    }

    async fn get(&self, descriptor: &FileDescriptor) -> Result<(Vec<u8>, FileLocation)> {
        let location = descriptor.require_location(LOCAL_DRIVER)?;
        let fs_path = self.to_fs_path(&location.location)?;

        let data = fs::read(&fs_path)
            .await
            .map_err(|e| Error::from_io(e, fs_path.display()))?;

        debug!("Read {} bytes for file {}", data.len(), descriptor.id);
        Ok((data, location.clone()))
    }

    async fn put(&self, descriptor: &FileDescriptor, payload: &[u8]) -> Result<FileDescriptor> {
        let key = derive_key(descriptor.id, &descriptor.name);
        let fs_path = self.to_fs_path(&key)?;

        // Write beside the target and rename so readers never see a partial file
        let tmp_path = self.root()?.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp_path, payload).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::from_io(e, tmp_path.display()));
        }
        if let Err(e) = fs::rename(&tmp_path, &fs_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::from_io(e, fs_path.display()));
        }

        if let Some(old) = superseded_location(descriptor, LOCAL_DRIVER, "", &key) {
            let old_path = self.to_fs_path(&old.location)?;
            match fs::remove_file(&old_path).await {
                Ok(()) => debug!("Removed superseded {}", old.location),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::from_io(e, old_path.display())),
            }
        }

        debug!("Wrote {} bytes for file {} to {}", payload.len(), descriptor.id, key);
        let location = FileLocation::new("", LOCAL_DRIVER, key);
        Ok(stored_descriptor(descriptor, location, payload))
    }

    async fn delete(
        &self,
        descriptor: &FileDescriptor,
        location: Option<&FileLocation>,
    ) -> Result<FileDescriptor> {
        let current = resolve_delete_target(descriptor, LOCAL_DRIVER, location)?;
        let fs_path = self.to_fs_path(&current.location)?;

        fs::remove_file(&fs_path)
            .await
            .map_err(|e| Error::from_io(e, fs_path.display()))?;

        debug!("Removed {} for file {}", current.location, descriptor.id);
        Ok(descriptor.without_location(current))
    }
}
