//! S3 object store driver.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

use crate::driver::{
    option_value, resolve_delete_target, stored_descriptor, superseded_location, DriverOptions,
    StorageDriver,
};
use fsabstract_common::{derive_key, Error, FileDescriptor, FileLocation, Result};

/// Registry name of the S3 driver.
pub const S3_DRIVER: &str = "s3";

/// Default region when `s3.region` is not set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Region names accepted when talking to AWS itself.
const AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "ca-central-1",
    "ca-west-1",
    "sa-east-1",
    "mx-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "me-south-1",
    "me-central-1",
    "il-central-1",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-southeast-5",
    "ap-southeast-7",
    "cn-north-1",
    "cn-northwest-1",
];

/// S3 object store driver.
///
/// Objects are written to `s3.bucket` under [`derive_key`]. Setting
/// `s3.endpoint` targets an S3-compatible service with path-style
/// addressing, in which case any region name is accepted.
pub struct S3Driver {
    bucket: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    region: String,
    endpoint: Option<String>,
    client: Option<S3Client>,
}

impl S3Driver {
    /// Create an unconfigured driver.
    pub fn new() -> Self {
        Self {
            bucket: None,
            access_key: None,
            secret_key: None,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            client: None,
        }
    }

    fn ready(&self) -> Result<(&S3Client, &str)> {
        match (&self.client, &self.bucket) {
            (Some(client), Some(bucket)) => Ok((client, bucket)),
            _ => Err(Error::NotInitialized(S3_DRIVER.to_string())),
        }
    }

    fn validate_region(&self, region: &str) -> Result<()> {
        if region.trim().is_empty() {
            return Err(Error::Configuration("s3.region cannot be empty".to_string()));
        }
        if self.endpoint.is_none() && !AWS_REGIONS.contains(&region) {
            return Err(Error::Configuration(format!(
                "Unable to resolve S3 region '{}'",
                region
            )));
        }
        Ok(())
    }
}

impl Default for S3Driver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn driver_name(&self) -> &str {
        S3_DRIVER
    }

    fn configure(&mut self, options: &DriverOptions) -> Result<()> {
        if let Some(endpoint) = option_value(options, S3_DRIVER, "endpoint") {
            self.endpoint = Some(endpoint.to_string()).filter(|e| !e.is_empty());
        }
        if let Some(bucket) = option_value(options, S3_DRIVER, "bucket") {
            self.bucket = Some(bucket.to_string());
        }
        if let Some(key) = option_value(options, S3_DRIVER, "accessKey") {
            self.access_key = Some(key.to_string());
        }
        if let Some(key) = option_value(options, S3_DRIVER, "secretKey") {
            self.secret_key = Some(key.to_string());
        }
        if let Some(region) = option_value(options, S3_DRIVER, "region") {
            self.region = region.to_string();
        }
        Ok(())
    }

    async fn initialize(&mut self) -> Result<()> {
        let bucket = self
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::Configuration("S3 driver requires 's3.bucket'".to_string()))?;
        let (access_key, secret_key) = match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => (access.clone(), secret.clone()),
            _ => {
                return Err(Error::Configuration(
                    "S3 driver requires 's3.accessKey' and 's3.secretKey'".to_string(),
                ))
            }
        };
        // Checked here so option order across configure calls does not matter
        self.validate_region(&self.region)?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "fsabstract");
        let mut s3_config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &self.endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }
        let client = S3Client::from_conf(s3_config.build());

        client
            .head_bucket()
            .bucket(&bucket)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Cannot reach bucket '{}': {}", bucket, e)))?;

        debug!("S3 driver ready for bucket {} in {}", bucket, self.region);
        self.client = Some(client);
        Ok(())
    }

    async fn get(&self, descriptor: &FileDescriptor) -> Result<(Vec<u8>, FileLocation)> {
        let (client, bucket) = self.ready()?;
        let location = descriptor.require_location(S3_DRIVER)?;

        let output = client
            .get_object()
            .bucket(bucket)
            .key(&location.location)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetObjectError::NoSuchKey(_) => {
                    Error::NotFound(format!("Object not found: {}", location.location))
                }
                other => Error::Backend(other.to_string()),
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Backend(format!("Failed to read body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok((data, location.clone()))
    }

    async fn put(&self, descriptor: &FileDescriptor, payload: &[u8]) -> Result<FileDescriptor> {
        let (client, bucket) = self.ready()?;
        let key = derive_key(descriptor.id, &descriptor.name);

        let mut request = client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(payload.to_vec()));
        if !descriptor.file_type.is_empty() {
            request = request.content_type(&descriptor.file_type);
        }
        request
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to write object: {}", e)))?;

        if let Some(old) = superseded_location(descriptor, S3_DRIVER, bucket, &key) {
            client
                .delete_object()
                .bucket(bucket)
                .key(&old.location)
                .send()
                .await
                .map_err(|e| Error::Backend(format!("Failed to delete superseded object: {}", e)))?;
        }

        debug!("Uploaded {} bytes for file {} to {}", payload.len(), descriptor.id, bucket);
        let location = FileLocation::new(bucket, S3_DRIVER, key);
        Ok(stored_descriptor(descriptor, location, payload))
    }

    async fn delete(
        &self,
        descriptor: &FileDescriptor,
        location: Option<&FileLocation>,
    ) -> Result<FileDescriptor> {
        let (client, bucket) = self.ready()?;
        let current = resolve_delete_target(descriptor, S3_DRIVER, location)?;

        // S3 deletes succeed for missing keys, so check first
        client
            .head_object()
            .bucket(bucket)
            .key(&current.location)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                HeadObjectError::NotFound(_) => {
                    Error::NotFound(format!("Object not found: {}", current.location))
                }
                other => Error::Backend(other.to_string()),
            })?;

        client
            .delete_object()
            .bucket(bucket)
            .key(&current.location)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to delete object: {}", e)))?;

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

    #[tokio::test]
    async fn test_s3_unknown_region_is_configuration_error() {
        let mut driver = S3Driver::new();
        driver
            .configure(&options(&[
                ("s3.region", "mars-north-1"),
                ("s3.bucket", "files"),
                ("s3.accessKey", "a"),
                ("s3.secretKey", "s"),
            ]))
            .unwrap();
        assert!(matches!(
            driver.initialize().await,
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_s3_region_before_endpoint_is_accepted() {
        let mut driver = S3Driver::new();
        driver.configure(&options(&[("s3.region", "garage")])).unwrap();
        driver
            .configure(&options(&[("s3.endpoint", "http://localhost:9000")]))
            .unwrap();

        assert_eq!(driver.region, "garage");
        assert!(driver.validate_region(&driver.region).is_ok());
    }

    #[test]
    fn test_s3_custom_endpoint_accepts_any_region() {
        let mut driver = S3Driver::new();
        driver
            .configure(&options(&[
                ("s3.endpoint", "http://localhost:9000"),
                ("s3.region", "garage"),
                ("s3.bucket", "files"),
            ]))
            .unwrap();
        assert_eq!(driver.region, "garage");
        assert_eq!(driver.bucket.as_deref(), Some("files"));
    }

    #[test]
    fn test_s3_last_configure_wins() {
        let mut driver = S3Driver::new();
        driver.configure(&options(&[("s3.bucket", "one")])).unwrap();
        driver.configure(&options(&[("s3.bucket", "two")])).unwrap();
        assert_eq!(driver.bucket.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_s3_initialize_requires_bucket_and_keys() {
        let mut driver = S3Driver::new();
        assert!(matches!(
            driver.initialize().await,
            Err(Error::Configuration(_))
        ));

        driver.configure(&options(&[("s3.bucket", "files")])).unwrap();
        assert!(matches!(
            driver.initialize().await,
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_s3_uninitialized_is_guarded() {
        let driver = S3Driver::new();
        let result = driver.get(&FileDescriptor::new(1, "a")).await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
    }
}
