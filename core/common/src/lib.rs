//! Common types shared across the fsabstract crates.
//!
//! This crate holds the file descriptor model, which is the persisted
//! record of where a file's copies live, and the error taxonomy used by
//! every driver.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{derive_key, FileDescriptor, FileLocation};
