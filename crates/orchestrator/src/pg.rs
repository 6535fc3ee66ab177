//! Postgres-backed implementations of the orchestrator ports.
//!
//! Thin adapters over the `lumen-db` repositories; all SQL lives there.

use std::time::Duration;

use async_trait::async_trait;
use lumen_core::types::DbId;
use lumen_db::models::asset::NewAsset;
use lumen_db::models::generation::Generation;
use lumen_db::models::status::{AssetStatus, AssetVisibility};
use lumen_db::repositories::{AssetRepo, CreditRepo, GenerationRepo};
use lumen_db::DbPool;

use crate::ports::{AssetPublisher, CreditLedger, JobStore, PublishError};

/// Job store backed by the `generations` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find(&self, id: DbId) -> Result<Option<Generation>, sqlx::Error> {
        GenerationRepo::find_by_id(&self.pool, id).await
    }

    async fn mark_processing(&self, id: DbId) -> Result<bool, sqlx::Error> {
        GenerationRepo::mark_processing(&self.pool, id).await
    }

    async fn set_request_id(&self, id: DbId, request_id: &str) -> Result<(), sqlx::Error> {
        GenerationRepo::set_request_id(&self.pool, id, request_id).await
    }

    async fn complete(&self, id: DbId, asset_id: DbId) -> Result<bool, sqlx::Error> {
        GenerationRepo::complete(&self.pool, id, asset_id).await
    }

    async fn fail(&self, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        GenerationRepo::fail(&self.pool, id, error).await
    }

    async fn stale_processing(
        &self,
        stale_after: Duration,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        GenerationRepo::find_stale_processing(&self.pool, stale_after.as_secs() as i64).await
    }

    async fn reclaim_stale(&self, id: DbId, stale_after: Duration) -> Result<bool, sqlx::Error> {
        GenerationRepo::reclaim_stale(&self.pool, id, stale_after.as_secs() as i64).await
    }
}

/// Credit ledger backed by `credit_accounts` and `credit_refunds`.
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: DbPool,
}

impl PgCreditLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn refund(
        &self,
        generation_id: DbId,
        user_id: DbId,
        amount: i32,
    ) -> Result<bool, sqlx::Error> {
        CreditRepo::refund(&self.pool, generation_id, user_id, amount).await
    }
}

/// Publishes completed generations as rows in the `assets` table.
///
/// Assets start public; the owner can restrict visibility afterwards.
#[derive(Clone)]
pub struct PgAssetPublisher {
    pool: DbPool,
}

impl PgAssetPublisher {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetPublisher for PgAssetPublisher {
    async fn publish(
        &self,
        job: &Generation,
        storage_key: &str,
        public_url: &str,
    ) -> Result<DbId, PublishError> {
        // The FK will also catch this, but a missing row here means the
        // caller is holding a stale Generation; name the job in the error.
        if GenerationRepo::find_by_id(&self.pool, job.id).await?.is_none() {
            return Err(PublishError::JobMissing { id: job.id });
        }

        let asset = AssetRepo::insert(
            &self.pool,
            &NewAsset {
                user_id: job.user_id,
                kind_id: job.kind_id,
                visibility_id: AssetVisibility::Public.id(),
                status_id: AssetStatus::Ready.id(),
                storage_key: storage_key.to_string(),
                public_url: public_url.to_string(),
                prompt: job.prompt.clone(),
                metadata: None,
            },
        )
        .await?;
        Ok(asset.id)
    }
}
