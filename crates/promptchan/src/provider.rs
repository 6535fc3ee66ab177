//! Capability traits and stable internal contract for generation providers.
//!
//! Image generation is synchronous: one call, one artifact. Video
//! generation is asynchronous (submit, poll, fetch) because render time
//! is unbounded and must not hold a request thread open.

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A synchronous image generation request.
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    /// Quality tier name (`standard` / `high` / `max`).
    pub quality: String,
    pub seed: Option<i64>,
    pub restore_faces: bool,
}

/// An asynchronous video generation request.
#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub prompt: String,
    /// Quality tier name (`standard` / `high` / `max`).
    pub quality: String,
    pub aspect_ratio: Option<String>,
    pub audio: bool,
    pub seed: Option<i64>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// What a successful image call hands back: either the bytes inline or a
/// reference the caller must download itself.
#[derive(Debug, Clone)]
pub enum ImageArtifact {
    Bytes(Vec<u8>),
    Url(String),
}

/// Provider-side lifecycle phase of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPhase {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProviderPhase {
    /// Map the provider's phase string onto the internal contract.
    pub fn parse(phase: &str) -> Result<Self, ProviderError> {
        match phase {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ProviderError::Malformed(format!(
                "Unknown status phase '{other}'"
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Snapshot from a non-blocking status poll. Safe to request repeatedly.
#[derive(Debug, Clone)]
pub struct VideoStatus {
    pub phase: ProviderPhase,
    /// Render progress in `0.0..=1.0`, when the provider reports it.
    pub progress: Option<f32>,
    pub queue_position: Option<u32>,
    /// Provider-reported failure text, populated when `phase` is `Failed`.
    pub error: Option<String>,
}

/// Artifact references for a completed asynchronous job, in provider order.
#[derive(Debug, Clone)]
pub struct VideoResult {
    pub artifact_urls: Vec<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by provider calls.
///
/// Transport failures and provider-reported business failures are kept
/// distinct so operators can tell network trouble from provider-side
/// rejections (e.g. content policy). The orchestrator collapses both to
/// a failed job, carrying the variant's text verbatim as the diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// HTTP success, but the payload reports a generation failure.
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// A submit call succeeded without returning a request identifier.
    #[error("Provider submit response omitted a request id")]
    MissingRequestId,

    /// The payload did not match the documented shape.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Synchronous generation capability (images).
#[async_trait]
pub trait ImageGeneration: Send + Sync {
    /// Generate one image. Any non-success outcome is a hard failure
    /// carrying the provider's error text verbatim — never a silent
    /// default artifact.
    async fn generate(&self, request: &ImageRequest) -> Result<ImageArtifact, ProviderError>;
}

/// Asynchronous job generation capability (video).
#[async_trait]
pub trait VideoGeneration: Send + Sync {
    /// Initiate a render; returns the provider's external job id.
    async fn submit(&self, request: &VideoRequest) -> Result<String, ProviderError>;

    /// Non-blocking status check for a submitted job.
    async fn poll_status(&self, request_id: &str) -> Result<VideoStatus, ProviderError>;

    /// Retrieve artifact references for a job whose status reported
    /// `Completed`. Calling earlier is a caller error, not a provider one.
    async fn fetch_result(&self, request_id: &str) -> Result<VideoResult, ProviderError>;
}

/// Both capabilities together; what the orchestrator holds.
pub trait GenerationProvider: ImageGeneration + VideoGeneration {}

impl<T: ImageGeneration + VideoGeneration> GenerationProvider for T {}
