//! Pending-job dispatcher.
//!
//! Polls for pending generation jobs every `poll_interval` and hands
//! each to the orchestrator on its own task. Uses `SELECT FOR UPDATE
//! SKIP LOCKED` via [`GenerationRepo::claim_next`], so concurrent
//! dispatcher instances never double-dispatch a job.

use std::sync::Arc;
use std::time::Duration;

use lumen_db::repositories::GenerationRepo;
use lumen_db::DbPool;
use lumen_orchestrator::GenerationOrchestrator;
use tokio_util::sync::CancellationToken;

/// Default polling interval for the dispatcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Background job dispatcher: a single long-lived Tokio task feeding
/// claimed jobs to per-job worker tasks.
pub struct JobDispatcher {
    pool: DbPool,
    orchestrator: Arc<GenerationOrchestrator>,
    poll_interval: Duration,
}

impl JobDispatcher {
    /// Create a new dispatcher with the default 1-second poll interval.
    pub fn new(pool: DbPool, orchestrator: Arc<GenerationOrchestrator>) -> Self {
        Self {
            pool,
            orchestrator,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_pending().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: claim until the pending queue is empty.
    ///
    /// The claim itself performs `pending -> processing`, so a job is
    /// owned by exactly one task the instant it leaves this loop.
    async fn drain_pending(&self) -> Result<(), sqlx::Error> {
        while let Some(job) = GenerationRepo::claim_next(&self.pool).await? {
            tracing::info!(
                job_id = job.id,
                user_id = job.user_id,
                "Job claimed for processing",
            );

            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                if let Err(e) = orchestrator.process(job.id).await {
                    tracing::error!(job_id = job.id, error = %e, "Job processing failed");
                }
            });
        }
        Ok(())
    }
}
