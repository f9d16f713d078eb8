//! S3 range reads.
//!
//! Issues `GetObject` with a `Range: bytes=<start>-<end>` header and hands
//! back the response body as an async reader, so the pipeline pulls bytes
//! from the network only as fast as it can emit them.

use crate::blob::{BlobStore, BlobStream};
use crate::config::S3Config;
use crate::error::{DeliveryError, DeliveryResult};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

/// Blob store backed by an S3-compatible bucket.
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    /// Builds a client from config. Static credentials are used when set,
    /// otherwise the default AWS provider chain.
    pub async fn connect(config: &S3Config) -> DeliveryResult<Self> {
        if config.bucket.is_empty() {
            return Err(DeliveryError::Config("missing s3.bucket".into()));
        }

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_types::region::Region::new(config.region.clone()))
            .load()
            .await;

        let mut config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let credentials = aws_credential_types::Credentials::new(
                    access_key_id,
                    secret_access_key,
                    None,
                    None,
                    "docstream-static",
                );
                config_builder = config_builder.credentials_provider(credentials);
            }
            (None, None) => {}
            _ => {
                return Err(DeliveryError::Config(
                    "s3.access_key_id and s3.secret_access_key must be set together".into(),
                ));
            }
        }

        if let Some(ref endpoint) = config.endpoint_override {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Ok(Self::from_client(
            S3Client::from_conf(config_builder.build()),
            config.bucket.clone(),
        ))
    }

    pub fn from_client(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str, start: u64, end: u64) -> DeliveryResult<BlobStream> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| {
                DeliveryError::StorageUnavailable(format!(
                    "range get failed for {key} bytes {start}-{end}: {}",
                    e.into_service_error()
                ))
            })?;

        debug!(
            "opened s3://{}/{key} bytes {start}-{end} ({:?} bytes)",
            self.bucket,
            resp.content_length()
        );

        Ok(Box::pin(resp.body.into_async_read()))
    }
}
