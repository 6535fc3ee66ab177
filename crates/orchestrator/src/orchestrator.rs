//! The generation state machine: `Pending -> Processing -> Completed | Failed`.
//!
//! Status only ever advances. A failed job is terminal; retrying means
//! submitting a new job, so every attempt stays inspectable. The
//! terminal `Failed` transition is the single refund trigger: whichever
//! call actually flips the row decides the refund, so re-delivery of a
//! failure signal can never refund twice.

use std::sync::Arc;
use std::time::Duration;

use lumen_core::pricing::QualityTier;
use lumen_core::types::{DbId, GenerationKind, GenerationSettings};
use lumen_db::models::generation::Generation;
use lumen_db::models::status::GenerationStatus;
use lumen_promptchan::{
    GenerationProvider, ImageArtifact, ImageRequest, ProviderPhase, VideoRequest,
};
use lumen_storage::{artifact_key, ArtifactStore};

use crate::config::OrchestratorConfig;
use crate::ports::{AssetPublisher, CreditLedger, JobStore, PublishError};

/// Stored filename for image artifacts.
const IMAGE_FILENAME: &str = "original.jpg";
/// Stored filename for video artifacts.
const VIDEO_FILENAME: &str = "original.mp4";
/// Content type for inline image bytes; the provider renders JPEG.
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Infrastructure-level failures of a processing attempt.
///
/// These do NOT fail the job: the row stays `Processing` and the
/// recovery sweep picks it up later. Job-level failures (provider
/// rejection, timeout, storage) are recorded on the row instead and
/// never surface here.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error("Generation not found: {id}")]
    JobNotFound { id: DbId },

    #[error("Internal consistency error: {0}")]
    Inconsistent(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] lumen_core::error::CoreError),
}

/// Why a job reached `Failed`, with the refund policy attached.
///
/// Storage failures are not refund-eligible: the provider delivered
/// usable output, so the user got what they paid for and the miss is an
/// operational incident, not a billing error.
#[derive(Debug)]
enum JobFailure {
    /// Provider transport or business failure. The wrapped text already
    /// distinguishes the two (see `ProviderError`'s Display impls).
    Provider(String),
    /// The poll budget elapsed without a terminal phase.
    PollTimeout(Duration),
    /// Generation succeeded but persistence did not.
    Storage(String),
    /// The worker died mid-flight and the attempt cannot be resumed.
    CrashRecovery,
}

impl JobFailure {
    fn refund_eligible(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    fn diagnostic(&self) -> String {
        match self {
            Self::Provider(text) => text.clone(),
            Self::PollTimeout(budget) => format!(
                "Provider did not reach a terminal status within the {}s poll budget",
                budget.as_secs()
            ),
            Self::Storage(text) => format!("Storage error: {text}"),
            Self::CrashRecovery => {
                "Worker crashed mid-processing; the attempt could not be resumed".to_string()
            }
        }
    }
}

/// Outcome of one flow step: either the job failed (terminal, recorded
/// on the row) or the infrastructure did (attempt abandoned, row stays
/// `Processing`).
enum FlowError {
    Job(JobFailure),
    Infra(OrchestrateError),
}

impl From<sqlx::Error> for FlowError {
    fn from(e: sqlx::Error) -> Self {
        Self::Infra(OrchestrateError::Db(e))
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one claimed generation job to a terminal state.
///
/// Each job is processed by exactly one logical worker at a time (the
/// dispatcher's atomic claim guarantees the handoff); distinct jobs run
/// concurrently and share nothing but the job store.
pub struct GenerationOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn ArtifactStore>,
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn CreditLedger>,
    publisher: Arc<dyn AssetPublisher>,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn ArtifactStore>,
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn CreditLedger>,
        publisher: Arc<dyn AssetPublisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            store,
            jobs,
            ledger,
            publisher,
            config,
        }
    }

    /// Process a job end to end.
    ///
    /// Accepts a job in `Pending` (performs the guarded transition
    /// itself) or already in `Processing` (claimed by the dispatcher, or
    /// resumed by the recovery sweep). Terminal jobs are left alone.
    pub async fn process(&self, job_id: DbId) -> Result<(), OrchestrateError> {
        let job = self
            .jobs
            .find(job_id)
            .await?
            .ok_or(OrchestrateError::JobNotFound { id: job_id })?;

        match job.status()? {
            GenerationStatus::Pending => {
                // Persist the transition before any external call so a
                // crash leaves a discoverable `Processing` row.
                if !self.jobs.mark_processing(job.id).await? {
                    tracing::warn!(job_id = job.id, "Job was picked up elsewhere; skipping");
                    return Ok(());
                }
            }
            GenerationStatus::Processing => {}
            status @ (GenerationStatus::Completed | GenerationStatus::Failed) => {
                tracing::warn!(
                    job_id = job.id,
                    status = status.as_str(),
                    "Job already terminal; nothing to do",
                );
                return Ok(());
            }
        }

        let result = match job.kind()? {
            GenerationKind::Image => self.run_image(&job).await,
            GenerationKind::Video => self.run_video(&job).await,
        };

        match result {
            Ok(asset_id) => {
                tracing::info!(
                    job_id = job.id,
                    asset_id,
                    kind = job.kind()?.as_str(),
                    "Generation completed",
                );
                Ok(())
            }
            Err(FlowError::Job(failure)) => self.finish_failed(&job, failure).await,
            Err(FlowError::Infra(e)) => Err(e),
        }
    }

    /// Terminal failure for a job abandoned mid-`Processing` by a dead
    /// worker. Called by the recovery sweep for attempts that cannot be
    /// resumed (images, and videos that never got a request id).
    pub async fn fail_crashed(&self, job: &Generation) -> Result<(), OrchestrateError> {
        self.finish_failed(job, JobFailure::CrashRecovery).await
    }

    // -- Image flow ---------------------------------------------------------

    async fn run_image(&self, job: &Generation) -> Result<DbId, FlowError> {
        let settings = job.parsed_settings();
        let request = image_request(job, &settings);

        let artifact = self
            .provider
            .generate(&request)
            .await
            .map_err(|e| FlowError::Job(JobFailure::Provider(e.to_string())))?;

        let key = artifact_key(job.user_id, job.id, IMAGE_FILENAME);
        let public_url = match artifact {
            ImageArtifact::Bytes(bytes) => {
                self.store.put(bytes, &key, IMAGE_CONTENT_TYPE).await
            }
            ImageArtifact::Url(url) => self.store.put_from_url(&url, &key).await,
        }
        .map_err(|e| FlowError::Job(JobFailure::Storage(e.to_string())))?;

        self.finish_completed(job, &key, &public_url).await
    }

    // -- Video flow ---------------------------------------------------------

    async fn run_video(&self, job: &Generation) -> Result<DbId, FlowError> {
        let settings = job.parsed_settings();

        let request_id = match &job.request_id {
            // Resumed after a crash: the submit already happened.
            Some(id) => id.clone(),
            None => {
                let request = video_request(job, &settings);
                let id = self
                    .provider
                    .submit(&request)
                    .await
                    .map_err(|e| FlowError::Job(JobFailure::Provider(e.to_string())))?;
                // Persist immediately: resumable polling depends on it.
                self.jobs.set_request_id(job.id, &id).await?;
                id
            }
        };

        self.poll_until_completed(job.id, &request_id).await?;

        let result = self
            .provider
            .fetch_result(&request_id)
            .await
            .map_err(|e| FlowError::Job(JobFailure::Provider(e.to_string())))?;

        // One asset per job; the provider returns one URL today. Extra
        // URLs are logged so a bundling decision later has data.
        if result.artifact_urls.len() > 1 {
            tracing::info!(
                job_id = job.id,
                count = result.artifact_urls.len(),
                "Provider returned multiple artifacts; publishing the first",
            );
        }
        let remote_url = result.artifact_urls.first().ok_or_else(|| {
            FlowError::Job(JobFailure::Provider(
                "Provider reported completion but returned no artifact URLs".to_string(),
            ))
        })?;

        let key = artifact_key(job.user_id, job.id, VIDEO_FILENAME);
        let public_url = self
            .store
            .put_from_url(remote_url, &key)
            .await
            .map_err(|e| FlowError::Job(JobFailure::Storage(e.to_string())))?;

        self.finish_completed(job, &key, &public_url).await
    }

    /// Poll on a capped exponential backoff until the provider reports
    /// `Completed`, converting `Failed` and budget exhaustion into job
    /// failures. Transient poll errors are tolerated within the budget —
    /// the status endpoint is safe to hit again.
    async fn poll_until_completed(
        &self,
        job_id: DbId,
        request_id: &str,
    ) -> Result<(), FlowError> {
        let deadline = tokio::time::Instant::now() + self.config.poll_budget;
        let mut interval = self.config.poll_initial_interval;

        loop {
            match self.provider.poll_status(request_id).await {
                Ok(status) => match status.phase {
                    ProviderPhase::Completed => return Ok(()),
                    ProviderPhase::Failed => {
                        return Err(FlowError::Job(JobFailure::Provider(
                            status
                                .error
                                .unwrap_or_else(|| "Video generation failed".to_string()),
                        )));
                    }
                    ProviderPhase::Pending | ProviderPhase::Processing => {
                        tracing::debug!(
                            job_id,
                            request_id,
                            progress = ?status.progress,
                            queue_position = ?status.queue_position,
                            "Video render in progress",
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(job_id, request_id, error = %e, "Status poll failed; will retry");
                }
            }

            if tokio::time::Instant::now() + interval > deadline {
                return Err(FlowError::Job(JobFailure::PollTimeout(
                    self.config.poll_budget,
                )));
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(self.config.poll_max_interval);
        }
    }

    // -- Terminal transitions -----------------------------------------------

    async fn finish_completed(
        &self,
        job: &Generation,
        storage_key: &str,
        public_url: &str,
    ) -> Result<DbId, FlowError> {
        let asset_id = self
            .publisher
            .publish(job, storage_key, public_url)
            .await
            .map_err(|e| match e {
                PublishError::JobMissing { id } => FlowError::Infra(
                    OrchestrateError::Inconsistent(format!(
                        "Generation {id} missing at publication time"
                    )),
                ),
                PublishError::Db(e) => FlowError::Infra(e.into()),
            })?;

        if !self.jobs.complete(job.id, asset_id).await? {
            // The guarded UPDATE found the row off `Processing` — someone
            // else finished it. The asset row exists but the single-writer
            // contract was broken upstream; shout about it.
            tracing::error!(
                job_id = job.id,
                asset_id,
                "Completion raced: job was no longer processing",
            );
        }
        Ok(asset_id)
    }

    async fn finish_failed(
        &self,
        job: &Generation,
        failure: JobFailure,
    ) -> Result<(), OrchestrateError> {
        let diagnostic = failure.diagnostic();
        let transitioned = self.jobs.fail(job.id, &diagnostic).await?;

        if !transitioned {
            // Already terminal; the earlier transition owned the refund
            // decision. Nothing more to do.
            tracing::debug!(job_id = job.id, "Failure signal for already-terminal job");
            return Ok(());
        }

        tracing::warn!(job_id = job.id, error = %diagnostic, "Generation failed");

        if failure.refund_eligible() {
            let refunded = self
                .ledger
                .refund(job.id, job.user_id, job.credits_used)
                .await?;
            tracing::info!(
                job_id = job.id,
                user_id = job.user_id,
                amount = job.credits_used,
                refunded,
                "Refund processed",
            );
        } else {
            tracing::warn!(
                job_id = job.id,
                refund_withheld = true,
                "Generation succeeded but persistence failed; needs operational reconciliation",
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request mapping
// ---------------------------------------------------------------------------

fn image_request(job: &Generation, settings: &GenerationSettings) -> ImageRequest {
    ImageRequest {
        prompt: job.prompt.clone(),
        negative_prompt: job.negative_prompt.clone(),
        style: settings.style.clone(),
        quality: QualityTier::parse(settings.quality.as_deref()).as_str().to_string(),
        seed: settings.seed,
        restore_faces: settings.restore_faces == Some(true),
    }
}

fn video_request(job: &Generation, settings: &GenerationSettings) -> VideoRequest {
    VideoRequest {
        prompt: job.prompt.clone(),
        quality: QualityTier::parse(settings.quality.as_deref()).as_str().to_string(),
        aspect_ratio: settings.aspect_ratio.clone(),
        audio: settings.audio == Some(true),
        seed: settings.seed,
    }
}
