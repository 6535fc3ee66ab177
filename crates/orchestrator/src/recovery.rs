//! Recovery sweep for jobs orphaned by a worker crash.
//!
//! A job stuck in `Processing` past the staleness threshold belongs to
//! a worker that is gone. Video jobs that already persisted a provider
//! request id are resumable: polling the status endpoint is idempotent,
//! so the sweep just re-runs the flow from the poll step. Everything
//! else (images, and videos that died before the submit landed) cannot
//! be resumed without risking a double charge against the provider, so
//! those are failed and refunded.

use std::sync::Arc;

use lumen_core::types::GenerationKind;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::orchestrator::GenerationOrchestrator;
use crate::ports::JobStore;

/// Periodically scans for stale `Processing` jobs and resolves them.
pub struct RecoverySweeper {
    jobs: Arc<dyn JobStore>,
    orchestrator: Arc<GenerationOrchestrator>,
    config: OrchestratorConfig,
}

impl RecoverySweeper {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        orchestrator: Arc<GenerationOrchestrator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            jobs,
            orchestrator,
            config,
        }
    }

    /// Run the sweep loop until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Recovery sweeper started",
        );
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        // The first tick fires immediately: crash recovery should not
        // wait a full interval after a restart.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Recovery sweep failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Recovery sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// One pass: find stale jobs, resume the resumable, fail the rest.
    pub async fn sweep_once(&self) -> Result<(), sqlx::Error> {
        let stale = self.jobs.stale_processing(self.config.stale_after).await?;
        if stale.is_empty() {
            return Ok(());
        }
        tracing::warn!(count = stale.len(), "Found stale processing jobs");

        for job in stale {
            let resumable = matches!(job.kind(), Ok(GenerationKind::Video)) && job.request_id.is_some();

            if resumable {
                // Claim the job by re-stamping started_at. A resumed
                // attempt can easily outlive a sweep interval; without
                // the re-stamp the next pass would see the same stale
                // row and spawn a second worker for it.
                if !self
                    .jobs
                    .reclaim_stale(job.id, self.config.stale_after)
                    .await?
                {
                    tracing::debug!(job_id = job.id, "Stale job already claimed, skipping");
                    continue;
                }
                tracing::info!(job_id = job.id, "Resuming stale video job");
                let orchestrator = Arc::clone(&self.orchestrator);
                let job_id = job.id;
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.process(job_id).await {
                        tracing::error!(job_id, error = %e, "Resumed job processing failed");
                    }
                });
            } else {
                tracing::warn!(job_id = job.id, "Failing unrecoverable stale job");
                if let Err(e) = self.orchestrator.fail_crashed(&job).await {
                    tracing::error!(job_id = job.id, error = %e, "Could not fail stale job");
                }
            }
        }
        Ok(())
    }
}
