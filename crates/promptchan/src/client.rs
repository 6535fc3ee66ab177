//! HTTP adapter for the Promptchan external API.
//!
//! Endpoints: `POST /api/external/create` (image, synchronous),
//! `POST /api/external/video_v2/submit`, `GET /api/external/video_v2/
//! status/{id}`, `GET /api/external/video_v2/result/{id}`. Bearer auth.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::provider::{
    ImageArtifact, ImageGeneration, ImageRequest, ProviderError, ProviderPhase, VideoGeneration,
    VideoRequest, VideoResult, VideoStatus,
};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.promptchan.ai";

/// Provider connection settings, built once at process start and handed
/// to [`PromptchanClient::new`] — call paths never read the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bearer token for the external API.
    pub api_key: String,
    /// Base URL, overridable for tests and staging.
    pub base_url: String,
}

impl ProviderConfig {
    /// Load from `PROMPTCHAN_API_KEY` (required) and
    /// `PROMPTCHAN_BASE_URL` (optional).
    pub fn from_env() -> Result<Self, lumen_core::error::CoreError> {
        let api_key = std::env::var("PROMPTCHAN_API_KEY").map_err(|_| {
            lumen_core::error::CoreError::Internal("PROMPTCHAN_API_KEY must be set".into())
        })?;
        let base_url =
            std::env::var("PROMPTCHAN_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Ok(Self { api_key, base_url })
    }
}

/// HTTP client for the Promptchan external API.
pub struct PromptchanClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

// ---------------------------------------------------------------------------
// Wire shapes (current upstream snapshot)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateImageBody<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    quality: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    restore_faces: bool,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    success: bool,
    image_base64: Option<String>,
    image_url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitVideoBody<'a> {
    prompt: &'a str,
    quality: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SubmitVideoResponse {
    #[serde(default)]
    success: Option<bool>,
    request_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoStatusResponse {
    status: String,
    progress: Option<f32>,
    queue_position: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoResultResponse {
    #[serde(default)]
    status: Option<String>,
    video_url: Option<String>,
    #[serde(default)]
    video_urls: Vec<String>,
    error: Option<String>,
}

impl VideoResultResponse {
    /// Collect artifact URLs in provider order, whichever field carried them.
    fn urls(self) -> Vec<String> {
        if !self.video_urls.is_empty() {
            self.video_urls
        } else {
            self.video_url.into_iter().collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl PromptchanClient {
    /// Create a client with a fresh connection pool.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Ensure the response has a success status code; on failure capture
    /// the status and raw body verbatim for diagnostics.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ImageGeneration for PromptchanClient {
    async fn generate(&self, request: &ImageRequest) -> Result<ImageArtifact, ProviderError> {
        let body = CreateImageBody {
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref(),
            style: request.style.as_deref(),
            quality: &request.quality,
            seed: request.seed,
            restore_faces: request.restore_faces,
        };

        let response = self
            .client
            .post(self.url("/api/external/create"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let payload: ImageResponse = Self::parse_response(response).await?;

        if !payload.success {
            return Err(ProviderError::Rejected(
                payload.error.unwrap_or_else(|| "Image generation failed".into()),
            ));
        }

        if let Some(b64) = payload.image_base64 {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| ProviderError::Malformed(format!("Invalid base64 image: {e}")))?;
            return Ok(ImageArtifact::Bytes(bytes));
        }
        if let Some(url) = payload.image_url {
            return Ok(ImageArtifact::Url(url));
        }

        Err(ProviderError::Malformed(
            "Success response carried neither image_base64 nor image_url".into(),
        ))
    }
}

#[async_trait]
impl VideoGeneration for PromptchanClient {
    async fn submit(&self, request: &VideoRequest) -> Result<String, ProviderError> {
        let body = SubmitVideoBody {
            prompt: &request.prompt,
            quality: &request.quality,
            aspect_ratio: request.aspect_ratio.as_deref(),
            audio: request.audio,
            seed: request.seed,
        };

        let response = self
            .client
            .post(self.url("/api/external/video_v2/submit"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let payload: SubmitVideoResponse = Self::parse_response(response).await?;

        if payload.success == Some(false) {
            return Err(ProviderError::Rejected(
                payload.error.unwrap_or_else(|| "Video submit failed".into()),
            ));
        }

        let request_id = payload.request_id.ok_or(ProviderError::MissingRequestId)?;

        tracing::debug!(request_id = %request_id, "Video job submitted to provider");
        Ok(request_id)
    }

    async fn poll_status(&self, request_id: &str) -> Result<VideoStatus, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/api/external/video_v2/status/{request_id}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let payload: VideoStatusResponse = Self::parse_response(response).await?;
        let phase = ProviderPhase::parse(&payload.status)?;

        Ok(VideoStatus {
            phase,
            progress: payload.progress,
            queue_position: payload.queue_position,
            error: payload.error,
        })
    }

    async fn fetch_result(&self, request_id: &str) -> Result<VideoResult, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/api/external/video_v2/result/{request_id}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let payload: VideoResultResponse = Self::parse_response(response).await?;

        if let Some(error) = payload.error {
            return Err(ProviderError::Rejected(error));
        }
        if payload.status.as_deref() == Some("failed") {
            return Err(ProviderError::Rejected("Video generation failed".into()));
        }

        let urls = payload.urls();
        if urls.is_empty() {
            return Err(ProviderError::Malformed(
                "Result response carried no artifact URLs".into(),
            ));
        }

        Ok(VideoResult { artifact_urls: urls })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
