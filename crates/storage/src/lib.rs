//! Durable artifact storage on Cloudflare R2 (S3-compatible API).
//!
//! Keys are deterministic and namespaced by owner and job, so re-running
//! an upload for the same job overwrites the same object instead of
//! duplicating it. Storage failures are their own error kind: when an
//! upload fails the generation itself already succeeded, and the
//! orchestrator must not treat it as a provider failure.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;

use lumen_core::types::DbId;

/// Fallback content type when a downloaded artifact does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// R2 connection settings, built once at process start.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Cloudflare account id; determines the S3 endpoint.
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Public CDN base URL the bucket is served from, without a
    /// trailing slash.
    pub public_base_url: String,
}

impl StorageConfig {
    /// Load from `R2_ACCOUNT_ID`, `R2_ACCESS_KEY_ID`,
    /// `R2_SECRET_ACCESS_KEY`, `R2_BUCKET_NAME`, `R2_PUBLIC_URL`.
    /// All five are required.
    pub fn from_env() -> Result<Self, lumen_core::error::CoreError> {
        let require = |name: &str| {
            std::env::var(name).map_err(|_| {
                lumen_core::error::CoreError::Internal(format!("{name} must be set"))
            })
        };
        Ok(Self {
            account_id: require("R2_ACCOUNT_ID")?,
            access_key_id: require("R2_ACCESS_KEY_ID")?,
            secret_access_key: require("R2_SECRET_ACCESS_KEY")?,
            bucket: require("R2_BUCKET_NAME")?,
            public_base_url: require("R2_PUBLIC_URL")?.trim_end_matches('/').to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures in artifact persistence. Distinct from provider failures by
/// construction; see the orchestrator's refund policy.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object PUT failed.
    #[error("Storage upload failed for key '{key}': {message}")]
    Upload { key: String, message: String },

    /// Downloading a provider artifact reference failed at transport level.
    #[error("Artifact download failed: {0}")]
    Download(#[from] reqwest::Error),

    /// The artifact reference answered with a non-success status.
    #[error("Artifact download from {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Deterministic storage key for a generation's artifact:
/// `assets/{user_id}/{generation_id}/{filename}`.
pub fn artifact_key(user_id: DbId, generation_id: DbId, filename: &str) -> String {
    format!("assets/{user_id}/{generation_id}/{filename}")
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Upload capability the orchestrator depends on.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store raw bytes under `key`; returns the public content URL.
    /// Idempotent on the same key (overwrite, not duplicate).
    async fn put(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Download `remote_url` and store the bytes under `key`; returns the
    /// public content URL. Used when the provider hands back a reference
    /// instead of inline bytes.
    async fn put_from_url(&self, remote_url: &str, key: &str) -> Result<String, StorageError>;
}

// ---------------------------------------------------------------------------
// R2 implementation
// ---------------------------------------------------------------------------

/// [`ArtifactStore`] backed by an R2 bucket.
pub struct R2ArtifactStore {
    s3: aws_sdk_s3::Client,
    http: reqwest::Client,
    bucket: String,
    public_base_url: String,
}

impl R2ArtifactStore {
    /// Build the S3 client against the account-scoped R2 endpoint.
    pub async fn new(config: StorageConfig) -> Self {
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", config.account_id);
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "lumen-r2",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        Self {
            s3: aws_sdk_s3::Client::new(&sdk_config),
            http: reqwest::Client::new(),
            bucket: config.bucket,
            public_base_url: config.public_base_url,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

#[async_trait]
impl ArtifactStore for R2ArtifactStore {
    async fn put(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = bytes.len();

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(key, size, content_type, "Artifact stored");
        Ok(self.public_url(key))
    }

    async fn put_from_url(&self, remote_url: &str, key: &str) -> Result<String, StorageError> {
        let response = self.http.get(remote_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::DownloadStatus {
                url: remote_url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response.bytes().await?.to_vec();
        self.put(bytes, key, &content_type).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
