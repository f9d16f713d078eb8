//! Delivery engine configuration.

use crate::error::{DeliveryError, DeliveryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the delivery engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Size of each physical read from the blob store.
    pub read_buffer_size: usize,

    /// Bytes written to the sink between flushes.
    pub flush_threshold: usize,

    /// Master key lifetime, measured from creation.
    pub key_ttl_secs: u64,

    /// Interval between background cache sweeps.
    pub sweep_interval_secs: u64,

    /// Per-request timeout for opening a range and for each block read.
    pub read_timeout_secs: u64,

    /// Encrypt payloads of the discrete chunk operation.
    pub encrypt_chunks: bool,

    /// Encrypt full-range streams chunk by chunk.
    pub encrypt_range_stream: bool,

    /// Refuse documents whose format hint is not PDF.
    pub pdf_only: bool,

    /// Object store settings.
    pub s3: S3Config,
}

/// Connection settings for the S3-compatible object store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Bucket holding the documents.
    pub bucket: String,

    /// AWS region for S3.
    pub region: String,

    /// Optional S3 endpoint override (for MinIO in testing).
    pub endpoint_override: Option<String>,

    /// Static access key. When unset, the default AWS credential chain is used.
    pub access_key_id: Option<String>,

    /// Static secret key paired with `access_key_id`.
    pub secret_access_key: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 8 * 1024,
            flush_threshold: 64 * 1024,
            key_ttl_secs: 30 * 60,
            sweep_interval_secs: 60 * 60,
            read_timeout_secs: 30,
            encrypt_chunks: true,
            encrypt_range_stream: false,
            pdf_only: true,
            s3: S3Config::default(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "docstream-documents".to_string(),
            region: "us-east-1".to_string(),
            endpoint_override: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl DeliveryConfig {
    /// Creates a config for testing against local MinIO.
    pub fn test() -> Self {
        Self {
            read_timeout_secs: 5,
            s3: S3Config {
                bucket: "docstream-test".to_string(),
                region: "us-east-1".to_string(),
                endpoint_override: Some("http://localhost:9000".to_string()),
                access_key_id: Some("docstream-test".to_string()),
                secret_access_key: Some("docstream-test-secret".to_string()),
            },
            ..Self::default()
        }
    }

    /// Parses a JSON config document; missing fields take their defaults.
    pub fn from_json(json: &str) -> DeliveryResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> DeliveryResult<()> {
        if self.read_buffer_size == 0 {
            return Err(DeliveryError::Config("read_buffer_size must be positive".into()));
        }
        if self.flush_threshold == 0 {
            return Err(DeliveryError::Config("flush_threshold must be positive".into()));
        }
        if self.key_ttl_secs == 0 {
            return Err(DeliveryError::Config("key_ttl_secs must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(DeliveryError::Config("sweep_interval_secs must be positive".into()));
        }
        if self.read_timeout_secs == 0 {
            return Err(DeliveryError::Config("read_timeout_secs must be positive".into()));
        }
        if self.s3.bucket.is_empty() {
            return Err(DeliveryError::Config("missing s3.bucket".into()));
        }
        if self.s3.access_key_id.is_some() != self.s3.secret_access_key.is_some() {
            return Err(DeliveryError::Config(
                "s3.access_key_id and s3.secret_access_key must be set together".into(),
            ));
        }
        Ok(())
    }

    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
