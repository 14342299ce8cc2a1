//! File descriptor model.
//!
//! A [`FileDescriptor`] is the logical identity of one stored file. Each
//! physical copy of its bytes is recorded as a [`FileLocation`] naming the
//! driver that holds it and the driver-specific key it was written under.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Characters left as-is in derived keys. Everything else, `%` included,
/// is percent-encoded so distinct names never collide.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

/// Longest encoded name kept verbatim in a key.
pub const MAX_KEY_NAME_LEN: usize = 128;

/// Bytes of name digest appended to shortened keys.
const KEY_DIGEST_LEN: usize = 16;

/// Derive the backend key for a file from its id and name.
///
/// The id is rendered as lowercase hex, which never contains `_`, so the
/// first `_` after the prefix always terminates it. The result contains no
/// path separators and is safe to use as a file name, a Redis key or an
/// object-store key.
///
/// Names whose encoding exceeds [`MAX_KEY_NAME_LEN`] are shortened to an
/// encoded prefix, `~` and a blake2b digest of the full name. `~` is
/// always percent-encoded in names, so shortened keys never collide with
/// verbatim ones, and every key stays under 150 bytes.
pub fn derive_key(id: i64, name: &str) -> String {
    let encoded = utf8_percent_encode(name, KEY_ENCODE_SET).to_string();
    if encoded.len() <= MAX_KEY_NAME_LEN {
        return format!("fs_{:x}_{}", id, encoded);
    }

    use blake2::digest::consts::U16;
    use blake2::{Blake2b, Digest};

    let mut hasher = Blake2b::<U16>::new();
    hasher.update(name.as_bytes());
    let digest = hex::encode(hasher.finalize());

    // Encoded text is ASCII; back off so a %XX escape is not split
    let mut cut = MAX_KEY_NAME_LEN - 2 * KEY_DIGEST_LEN - 1;
    if let Some(pos) = encoded[cut - 2..cut].find('%') {
        cut = cut - 2 + pos;
    }
    format!("fs_{:x}_{}~{}", id, &encoded[..cut], digest)
}

/// One physical copy of a file held by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    /// Backend sub-identifier (bucket, server...). Empty for single-store backends.
    #[serde(rename = "storeId")]
    pub store_id: String,
    /// Name of the driver that wrote this copy.
    #[serde(rename = "storeDriver")]
    pub driver: String,
    /// Driver-specific key or path of this copy.
    #[serde(rename = "storeLocation")]
    pub location: String,
    /// When this copy was written.
    #[serde(rename = "storeCreated")]
    pub created: DateTime<Utc>,
}

impl FileLocation {
    /// Create a location stamped with the current time.
    pub fn new(
        store_id: impl Into<String>,
        driver: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            driver: driver.into(),
            location: location.into(),
            created: Utc::now(),
        }
    }

    /// Location that only names a driver, as used to address migrations.
    pub fn for_driver(driver: impl Into<String>) -> Self {
        Self::new("", driver, "")
    }
}

/// Identity, metadata and known copies of one logical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Application-assigned identifier. Never generated here.
    pub id: i64,
    /// Display filename.
    #[serde(rename = "filename")]
    pub name: String,
    /// Free-form content type.
    #[serde(rename = "filetype", default)]
    pub file_type: String,
    /// Payload length at last write.
    #[serde(default)]
    pub size: u64,
    /// When the file was first stored.
    pub created: DateTime<Utc>,
    /// Application-defined key/value pairs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
    /// Copies currently believed to exist, at most one per driver.
    #[serde(rename = "location", default, deserialize_with = "null_as_default")]
    pub locations: Vec<FileLocation>,
}

impl FileDescriptor {
    /// Create a descriptor that is not stored anywhere yet.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            file_type: String::new(),
            size: 0,
            created: Utc::now(),
            metadata: HashMap::new(),
            locations: Vec::new(),
        }
    }

    /// Find the copy held by `driver`.
    pub fn location_for_driver(&self, driver: &str) -> Option<&FileLocation> {
        self.locations.iter().find(|l| l.driver == driver)
    }

    /// Like [`location_for_driver`](Self::location_for_driver), failing with
    /// `NotFound` when the driver holds no copy.
    pub fn require_location(&self, driver: &str) -> Result<&FileLocation> {
        self.location_for_driver(driver).ok_or_else(|| {
            Error::NotFound(format!(
                "File {} has no location for driver '{}'",
                self.id, driver
            ))
        })
    }

    /// Return a copy with `location` recorded.
    ///
    /// An existing entry for the same driver is replaced in place, keeping
    /// at most one location per driver.
    pub fn with_location(&self, location: FileLocation) -> Self {
        let mut updated = self.clone();
        match updated
            .locations
            .iter_mut()
            .find(|l| l.driver == location.driver)
        {
            Some(existing) => *existing = location,
            None => updated.locations.push(location),
        }
        updated
    }

    /// Return a copy with every entry equal to `location` removed.
    pub fn without_location(&self, location: &FileLocation) -> Self {
        let mut updated = self.clone();
        updated.locations.retain(|l| l != location);
        updated
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize to indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Accept `null` for collections, which older writers emit when unset.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
