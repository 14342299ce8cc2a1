//! Migration of a file's bytes between drivers.
//!
//! A migration is get → put → delete. The destination copy is written
//! before the source copy is removed, so at least one copy exists at every
//! point; a failed delete leaves both copies recorded in the descriptor.

use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::driver::{DriverOptions, StorageDriver};
use crate::registry::DriverRegistry;
use fsabstract_common::{Error, FileDescriptor, FileLocation};

/// Step of a migration that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStage {
    /// Opening the source driver.
    OpenSource,
    /// Opening the destination driver.
    OpenDestination,
    /// Reading from the source.
    Get,
    /// Writing to the destination.
    Put,
    /// Removing the source copy.
    Delete,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStage::OpenSource => "open source",
            MigrationStage::OpenDestination => "open destination",
            MigrationStage::Get => "get",
            MigrationStage::Put => "put",
            MigrationStage::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A failed migration, with the descriptor as it stands after the failure.
///
/// Before the put succeeds this is the caller's descriptor unchanged.
/// After a failed delete it lists both the source and destination copies.
#[derive(Debug, Error)]
#[error("Migration of file {} failed at {stage}: {source}", .descriptor.id)]
pub struct MigrationError {
    /// Step that failed.
    pub stage: MigrationStage,
    /// Best-known descriptor state.
    pub descriptor: FileDescriptor,
    /// Underlying driver error.
    #[source]
    pub source: Error,
}

impl MigrationError {
    fn new(stage: MigrationStage, descriptor: FileDescriptor, source: Error) -> Self {
        Self {
            stage,
            descriptor,
            source,
        }
    }

    /// Whether the destination copy was written before the failure.
    pub fn has_duplicate_copy(&self) -> bool {
        self.stage == MigrationStage::Delete
    }
}

/// Moves files between drivers resolved from a registry.
///
/// Each migration opens fresh source and destination drivers with the
/// same option set. No step is retried.
pub struct Migrator<'a> {
    registry: &'a DriverRegistry,
    options: &'a DriverOptions,
}

impl<'a> Migrator<'a> {
    /// Create a migrator over a registry and driver options.
    pub fn new(registry: &'a DriverRegistry, options: &'a DriverOptions) -> Self {
        Self { registry, options }
    }

    /// Move the file from `source.driver` to `destination.driver`.
    ///
    /// Only the `driver` field of `source` and `destination` is used; the
    /// source copy itself is looked up in the descriptor.
    ///
    /// # Returns
    /// The descriptor with the destination location added and the source
    /// location removed.
    ///
    /// # Errors
    /// Every error carries the best-known descriptor, see [`MigrationError`].
    pub async fn migrate(
        &self,
        descriptor: &FileDescriptor,
        source: &FileLocation,
        destination: &FileLocation,
    ) -> Result<FileDescriptor, MigrationError> {
        let fail = |stage, err| MigrationError::new(stage, descriptor.clone(), err);

        let from = self
            .registry
            .open(&source.driver, self.options)
            .await
            .map_err(|e| fail(MigrationStage::OpenSource, e))?;
        let to = self
            .registry
            .open(&destination.driver, self.options)
            .await
            .map_err(|e| fail(MigrationStage::OpenDestination, e))?;

        if from.driver_name() == to.driver_name() {
            return Err(fail(
                MigrationStage::OpenDestination,
                Error::InvalidInput(format!(
                    "Source and destination are both driver '{}'",
                    from.driver_name()
                )),
            ));
        }

        migrate_between(from.as_ref(), to.as_ref(), descriptor).await
    }
}

/// Move a file between two ready drivers.
pub async fn migrate_between(
    from: &dyn StorageDriver,
    to: &dyn StorageDriver,
    descriptor: &FileDescriptor,
) -> Result<FileDescriptor, MigrationError> {
    let (payload, source_location) = from.get(descriptor).await.map_err(|e| {
        warn!("Migration of file {}: get from '{}' failed: {}", descriptor.id, from.driver_name(), e);
        MigrationError::new(MigrationStage::Get, descriptor.clone(), e)
    })?;
    info!(
        "Migrating file {} ({} bytes) from '{}' to '{}'",
        descriptor.id,
        payload.len(),
        from.driver_name(),
        to.driver_name()
    );

    let copied = to.put(descriptor, &payload).await.map_err(|e| {
        warn!("Migration of file {}: put to '{}' failed: {}", descriptor.id, to.driver_name(), e);
        MigrationError::new(MigrationStage::Put, descriptor.clone(), e)
    })?;

    let moved = match from.delete(&copied, Some(&source_location)).await {
        Ok(moved) => moved,
        Err(e) => {
            warn!(
                "Migration of file {}: delete from '{}' failed, both copies remain: {}",
                descriptor.id,
                from.driver_name(),
                e
            );
            return Err(MigrationError::new(MigrationStage::Delete, copied, e));
        }
    };

    info!("Migrated file {} to '{}'", descriptor.id, to.driver_name());
    Ok(moved)
}
