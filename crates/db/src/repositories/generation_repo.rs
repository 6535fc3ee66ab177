//! Repository for the `generations` table.
//!
//! Every status transition is a guarded UPDATE whose WHERE clause names
//! the allowed source statuses. The guards make transitions monotonic:
//! a row can never move backwards, and terminal rows never change again.
//! Transition methods return whether *this call* performed the change,
//! which is what lets the orchestrator decide refunds exactly once.

use lumen_core::types::DbId;
use sqlx::PgPool;

use crate::models::generation::{Generation, NewGeneration};
use crate::models::status::GenerationStatus;

/// Column list for `generations` queries.
const COLUMNS: &str = "\
    id, user_id, kind_id, prompt, negative_prompt, settings, engine, \
    status_id, request_id, credits_used, asset_id, error_message, \
    created_at, started_at, completed_at";

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Provides CRUD operations and guarded transitions for generation jobs.
pub struct GenerationRepo;

impl GenerationRepo {
    /// Insert a new job in `Pending`.
    ///
    /// Takes any executor so intake can run the credit debit and the
    /// insert inside one transaction.
    pub async fn create<'e, E>(executor: E, input: &NewGeneration) -> Result<Generation, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let settings = serde_json::to_value(&input.settings)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let query = format!(
            "INSERT INTO generations \
                 (user_id, kind_id, prompt, negative_prompt, settings, engine, status_id, credits_used) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(input.user_id)
            .bind(input.kind.id())
            .bind(&input.prompt)
            .bind(&input.negative_prompt)
            .bind(&settings)
            .bind(&input.engine)
            .bind(GenerationStatus::Pending.id())
            .bind(input.credits_used)
            .fetch_one(executor)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generations WHERE id = $1");
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's jobs, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List jobs in a given status, oldest first.
    pub async fn list_by_status(
        pool: &PgPool,
        status: GenerationStatus,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE status_id = $1 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(status.id())
            .fetch_all(pool)
            .await
    }

    /// Atomically claim the oldest pending job, moving it to `Processing`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent dispatcher
    /// instances never hand the same job to two workers. The status is
    /// persisted before any external call happens, so a crash mid-flight
    /// leaves a `Processing` row discoverable by the recovery sweep.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!(
            "UPDATE generations \
             SET status_id = $1, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM generations \
                 WHERE status_id = $2 \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(GenerationStatus::Processing.id())
            .bind(GenerationStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Transition `Pending -> Processing`. Returns `false` if the job was
    /// not pending (already picked up, or terminal).
    pub async fn mark_processing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, started_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(GenerationStatus::Processing.id())
        .bind(GenerationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist the provider's external request id (video jobs, immediately
    /// after a successful submit — needed for crash-resumable polling).
    pub async fn set_request_id(
        pool: &PgPool,
        id: DbId,
        request_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE generations SET request_id = $2 WHERE id = $1")
            .bind(id)
            .bind(request_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Transition `Processing -> Completed`, linking the published asset
    /// and stamping `completed_at`. Returns whether this call transitioned
    /// the row.
    pub async fn complete(pool: &PgPool, id: DbId, asset_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, asset_id = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(GenerationStatus::Completed.id())
        .bind(asset_id)
        .bind(GenerationStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition a non-terminal job to `Failed` with a diagnostic.
    ///
    /// Returns whether this call transitioned the row. A `false` return
    /// means the job already reached a terminal state — the caller must
    /// not issue a refund for it.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5)",
        )
        .bind(id)
        .bind(GenerationStatus::Failed.id())
        .bind(error)
        .bind(GenerationStatus::Completed.id())
        .bind(GenerationStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Re-stamp `started_at` on a stale `Processing` job before resuming
    /// it, so the next sweep does not hand the same job to a second
    /// worker while the resumed attempt is still running.
    ///
    /// Guarded the same way as the status transitions: the update only
    /// lands if the row is still `Processing` and still stale. Returns
    /// whether this call claimed the job.
    pub async fn reclaim_stale(
        pool: &PgPool,
        id: DbId,
        stale_after_secs: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET started_at = NOW() \
             WHERE id = $1 \
               AND status_id = $2 \
               AND started_at IS NOT NULL \
               AND started_at < NOW() - make_interval(secs => $3::DOUBLE PRECISION)",
        )
        .bind(id)
        .bind(GenerationStatus::Processing.id())
        .bind(stale_after_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Jobs stuck in `Processing` for longer than `stale_after_secs`,
    /// oldest first. Input to the recovery sweep.
    pub async fn find_stale_processing(
        pool: &PgPool,
        stale_after_secs: i64,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE status_id = $1 \
               AND started_at IS NOT NULL \
               AND started_at < NOW() - make_interval(secs => $2::DOUBLE PRECISION) \
             ORDER BY started_at ASC"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(GenerationStatus::Processing.id())
            .bind(stale_after_secs as f64)
            .fetch_all(pool)
            .await
    }
}
