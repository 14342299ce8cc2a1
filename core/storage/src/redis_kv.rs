//! Redis storage driver.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;
use url::Url;

use crate::driver::{
    option_value, resolve_delete_target, split_list, stored_descriptor, superseded_location,
    DriverOptions, StorageDriver,
};
use fsabstract_common::{derive_key, Error, FileDescriptor, FileLocation, Result};

/// Registry name of the Redis driver.
pub const REDIS_DRIVER: &str = "redis";

struct Connections {
    primary: ConnectionManager,
    replica: Option<ConnectionManager>,
}

/// Redis storage driver.
///
/// Writes and deletes go to `redis.server`. Reads use the first entry of
/// `redis.slaveServers` when one is configured, the primary otherwise.
pub struct RedisDriver {
    server: Option<String>,
    replicas: Vec<String>,
    connections: Option<Connections>,
}

impl RedisDriver {
    /// Create an unconfigured driver.
    pub fn new() -> Self {
        Self {
            server: None,
            replicas: Vec::new(),
            connections: None,
        }
    }

    fn connections(&self) -> Result<&Connections> {
        self.connections
            .as_ref()
            .ok_or_else(|| Error::NotInitialized(REDIS_DRIVER.to_string()))
    }

    /// Server URL without credentials, recorded as the location store id.
    fn store_id(&self) -> String {
        self.server
            .as_deref()
            .map(redact_url)
            .unwrap_or_default()
    }
}

impl Default for RedisDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Configuration(format!("Invalid Redis URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "redis" | "rediss" => Ok(()),
        other => Err(Error::Configuration(format!(
            "Unsupported Redis URL scheme '{}'",
            other
        ))),
    }
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let _ = url.set_password(None);
            let _ = url.set_username("");
            url.to_string()
        }
        Err(_) => String::new(),
    }
}

async fn connect(raw: &str) -> Result<ConnectionManager> {
    let client = Client::open(raw)
        .map_err(|e| Error::Configuration(format!("Invalid Redis URL: {}", e)))?;
    let mut conn = ConnectionManager::new(client)
        .await
        .map_err(|e| Error::Connection(format!("{}: {}", redact_url(raw), e)))?;
    let _: () = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| Error::Connection(format!("{}: {}", redact_url(raw), e)))?;
    Ok(conn)
}

fn backend(err: redis::RedisError) -> Error {
    Error::Backend(err.to_string())
}

#[async_trait]
impl StorageDriver for RedisDriver {
    fn driver_name(&self) -> &str {
        REDIS_DRIVER
    }

    fn configure(&mut self, options: &DriverOptions) -> Result<()> {
        if let Some(server) = option_value(options, REDIS_DRIVER, "server") {
            validate_url(server)?;
            self.server = Some(server.to_string());
        }
        if let Some(replicas) = option_value(options, REDIS_DRIVER, "slaveServers") {
            let replicas = split_list(replicas);
            for replica in &replicas {
                validate_url(replica)?;
            }
            self.replicas = replicas;
        }
        Ok(())
    }

    async fn initialize(&mut self) -> Result<()> {
        let server = self.server.clone().ok_or_else(|| {
            Error::Configuration("Redis driver requires 'redis.server'".to_string())
        })?;

        let primary = connect(&server).await?;
        let replica = match self.replicas.first() {
            Some(url) => Some(connect(url).await?),
            None => None,
        };

        debug!("Redis driver connected to {}", redact_url(&server));
        self.connections = Some(Connections { primary, replica });
        Ok(())
    }

    async fn get(&self, descriptor: &FileDescriptor) -> Result<(Vec<u8>, FileLocation)> {
        let connections = self.connections()?;
        let location = descriptor.require_location(REDIS_DRIVER)?;

        let mut conn = connections
            .replica
            .as_ref()
            .unwrap_or(&connections.primary)
            .clone();
        let data: Option<Vec<u8>> = conn.get(&location.location).await.map_err(backend)?;

        match data {
            Some(data) => Ok((data, location.clone())),
            None => Err(Error::NotFound(format!("Key not found: {}", location.location))),
        }
    }

    async fn put(&self, descriptor: &FileDescriptor, payload: &[u8]) -> Result<FileDescriptor> {
        let mut conn = self.connections()?.primary.clone();
        let key = derive_key(descriptor.id, &descriptor.name);

        let _: () = conn.set(&key, payload).await.map_err(backend)?;

        let store_id = self.store_id();
        if let Some(old) = superseded_location(descriptor, REDIS_DRIVER, &store_id, &key) {
            let _: i64 = conn.del(&old.location).await.map_err(backend)?;
        }

        debug!("Stored {} bytes for file {} in Redis", payload.len(), descriptor.id);
        let location = FileLocation::new(store_id, REDIS_DRIVER, key);
        Ok(stored_descriptor(descriptor, location, payload))
    }

    async fn delete(
        &self,
        descriptor: &FileDescriptor,
        location: Option<&FileLocation>,
    ) -> Result<FileDescriptor> {
        let mut conn = self.connections()?.primary.clone();
        let current = resolve_delete_target(descriptor, REDIS_DRIVER, location)?;

        let removed: i64 = conn.del(&current.location).await.map_err(backend)?;
        if removed == 0 {
            return Err(Error::NotFound(format!("Key not found: {}", current.location)));
        }

        Ok(descriptor.without_location(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> DriverOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_redis_configure() {
        let mut driver = RedisDriver::new();
        driver
            .configure(&options(&[
                ("redis.server", "redis://:secret@cache.internal:6380/2"),
                ("redis.slaveServers", "redis://r1:6379/2, redis://r2:6379/2"),
            ]))
            .unwrap();

        assert_eq!(driver.replicas.len(), 2);
        assert_eq!(driver.store_id(), "redis://cache.internal:6380/2");
    }

    #[test]
    fn test_redis_rejects_invalid_url() {
        let mut driver = RedisDriver::new();
        let result = driver.configure(&options(&[("redis.server", "not a url")]));
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = driver.configure(&options(&[("redis.server", "http://cache:6379")]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_redis_initialize_requires_server() {
        let mut driver = RedisDriver::new();
        assert!(matches!(
            driver.initialize().await,
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_redis_uninitialized_is_guarded() {
        let driver = RedisDriver::new();
        let result = driver.put(&FileDescriptor::new(1, "a"), b"x").await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
    }
}
