//! Storage driver abstraction for fsabstract.
//!
//! This crate provides a trait-based contract for storage backends (local
//! filesystem, in-memory cache, Redis, S3), a registry resolving drivers
//! by name, and a migration engine that moves a file between drivers.
//!
//! # Design Principles
//! - Descriptors are values: drivers return updated copies, never mutate
//! - The descriptor's location list is the source of truth for lookups
//! - One shared key derivation for every backend
//! - Errors are returned to the caller, never retried internally

pub mod driver;
pub mod local;
pub mod memory;
pub mod migrate;
pub mod registry;

#[cfg(feature = "redis")]
pub mod redis_kv;
#[cfg(feature = "s3")]
pub mod s3;

pub use driver::{load_options, option_key, DriverOptions, StorageDriver};
pub use local::LocalDriver;
pub use memory::{MemoryDriver, MemoryStore};
pub use migrate::{migrate_between, MigrationError, MigrationStage, Migrator};
pub use registry::{create_default_registry, driver_factory, DriverFactory, DriverRegistry};

#[cfg(feature = "redis")]
pub use redis_kv::RedisDriver;
#[cfg(feature = "s3")]
pub use s3::S3Driver;
