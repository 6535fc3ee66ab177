//! Collaborator ports for the state machine.
//!
//! Each trait is exactly the slice of a collaborator the orchestrator
//! needs — narrow enough that the integration tests implement them with
//! a couple of mutexed vectors. Production adapters live in [`crate::pg`].

use std::time::Duration;

use async_trait::async_trait;
use lumen_core::types::DbId;
use lumen_db::models::generation::Generation;

/// Durable job record access with guarded, monotonic transitions.
///
/// Transition methods return whether *this call* performed the change;
/// `false` means the row was already past the source state. The
/// orchestrator leans on that for its exactly-once refund decision.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find(&self, id: DbId) -> Result<Option<Generation>, sqlx::Error>;

    /// `Pending -> Processing`.
    async fn mark_processing(&self, id: DbId) -> Result<bool, sqlx::Error>;

    /// Persist the provider's external request id (video only).
    async fn set_request_id(&self, id: DbId, request_id: &str) -> Result<(), sqlx::Error>;

    /// `Processing -> Completed`, linking the published asset.
    async fn complete(&self, id: DbId, asset_id: DbId) -> Result<bool, sqlx::Error>;

    /// Any non-terminal state `-> Failed` with a diagnostic.
    async fn fail(&self, id: DbId, error: &str) -> Result<bool, sqlx::Error>;

    /// Jobs abandoned in `Processing` longer than `stale_after`.
    async fn stale_processing(&self, stale_after: Duration)
        -> Result<Vec<Generation>, sqlx::Error>;

    /// Re-stamp `started_at` on a job that is still `Processing` and
    /// still stale, claiming it for a resume attempt. Returns `false`
    /// if another sweep already claimed it.
    async fn reclaim_stale(&self, id: DbId, stale_after: Duration) -> Result<bool, sqlx::Error>;
}

/// Credit-ledger slice the orchestrator needs: crediting back the
/// originally charged amount on a refund-eligible failure. Debiting
/// happens at intake, before a job exists.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Idempotent per generation. Returns whether this call issued the
    /// refund (`false` = already refunded earlier).
    async fn refund(
        &self,
        generation_id: DbId,
        user_id: DbId,
        amount: i32,
    ) -> Result<bool, sqlx::Error>;
}

/// Failures from asset publication.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The job row vanished between processing and publication. A
    /// programmer error or race, not a user-facing failure.
    #[error("Generation {id} missing at publication time")]
    JobMissing { id: DbId },

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Converts a completed job into a publicly listable asset record.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    /// Create the asset (public visibility, ready status, zero likes,
    /// prompt and owner denormalized from the job). Returns its id.
    /// Invoked at most once per job.
    async fn publish(
        &self,
        job: &Generation,
        storage_key: &str,
        public_url: &str,
    ) -> Result<DbId, PublishError>;
}
