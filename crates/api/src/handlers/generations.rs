//! Handlers for generation job intake and observation.
//!
//! Routes:
//! - `POST /generations`      — price, debit, and enqueue a job
//! - `GET  /generations`      — list own jobs, newest first
//! - `GET  /generations/{id}` — observe one job

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lumen_core::error::CoreError;
use lumen_core::types::{DbId, GenerationKind, GenerationSettings, Timestamp};
use lumen_core::{pricing, validation};
use lumen_db::models::generation::{Generation, NewGeneration};
use lumen_db::repositories::{CreditRepo, GenerationRepo};
use lumen_promptchan::ENGINE_PROMPTCHAN;
use serde::{Deserialize, Serialize};

use crate::auth::Owner;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Create-generation request body.
#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub kind: GenerationKind,
    pub quality: Option<String>,
    pub style: Option<String>,
    pub aspect_ratio: Option<String>,
    pub audio: Option<bool>,
    pub seed: Option<i64>,
    pub restore_faces: Option<bool>,
}

impl CreateGenerationRequest {
    fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            style: self.style.clone(),
            quality: self.quality.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            audio: self.audio,
            seed: self.seed,
            restore_faces: self.restore_faces,
        }
    }
}

/// Caller-facing view of a generation job. Internal provider bookkeeping
/// (`request_id`) stays off the wire.
#[derive(Debug, Serialize)]
pub struct GenerationView {
    pub id: DbId,
    pub kind: &'static str,
    pub status: &'static str,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub settings: serde_json::Value,
    pub credits_used: i32,
    pub asset_id: Option<DbId>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<Generation> for GenerationView {
    type Error = CoreError;

    fn try_from(job: Generation) -> Result<Self, CoreError> {
        Ok(Self {
            id: job.id,
            kind: job.kind()?.as_str(),
            status: job.status()?.as_str(),
            prompt: job.prompt,
            negative_prompt: job.negative_prompt,
            settings: job.settings,
            credits_used: job.credits_used,
            asset_id: job.asset_id,
            error_message: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        })
    }
}

/// POST /api/v1/generations
///
/// Validates the request, prices it, debits the owner's credits, and
/// inserts the pending job — debit and insert in one transaction, so a
/// job row always has its charge behind it. Returns `201` immediately;
/// the job is picked up asynchronously by the worker.
pub async fn create_generation(
    State(state): State<AppState>,
    owner: Owner,
    Json(input): Json<CreateGenerationRequest>,
) -> AppResult<impl IntoResponse> {
    validation::validate_prompt(&input.prompt).map_err(AppError::Core)?;
    validation::validate_negative_prompt(input.negative_prompt.as_deref())
        .map_err(AppError::Core)?;

    let settings = input.settings();
    let cost = pricing::generation_cost(input.kind, &settings);

    let mut tx = state.pool.begin().await?;

    if !CreditRepo::debit(&mut *tx, owner.0, cost).await? {
        tx.rollback().await?;
        let available = CreditRepo::balance(&state.pool, owner.0).await?;
        return Err(AppError::Core(CoreError::InsufficientCredits {
            required: cost,
            available,
        }));
    }

    let job = GenerationRepo::create(
        &mut *tx,
        &NewGeneration {
            user_id: owner.0,
            kind: input.kind,
            prompt: input.prompt.trim().to_string(),
            negative_prompt: input.negative_prompt,
            settings,
            engine: ENGINE_PROMPTCHAN.to_string(),
            credits_used: cost,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        job_id = job.id,
        user_id = owner.0,
        kind = input.kind.as_str(),
        credits = cost,
        "Generation job enqueued",
    );

    let view = GenerationView::try_from(job).map_err(AppError::Core)?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: view })))
}

/// Query parameters for job listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// GET /api/v1/generations
///
/// List the caller's jobs, newest first.
pub async fn list_generations(
    State(state): State<AppState>,
    owner: Owner,
    Query(params): Query<ListParams>,
) -> AppResult<impl IntoResponse> {
    let jobs = GenerationRepo::list_by_user(&state.pool, owner.0, params.limit).await?;
    let views = jobs
        .into_iter()
        .map(GenerationView::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::Core)?;
    Ok(Json(DataResponse { data: views }))
}

/// GET /api/v1/generations/{id}
///
/// Observe one job. Jobs owned by someone else read as absent.
pub async fn get_generation(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = GenerationRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|job| job.user_id == owner.0)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Generation",
            id,
        }))?;

    let view = GenerationView::try_from(job).map_err(AppError::Core)?;
    Ok(Json(DataResponse { data: view }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(kind: GenerationKind, status_id: i16) -> Generation {
        Generation {
            id: 1,
            user_id: 7,
            kind_id: kind.id(),
            prompt: "a red fox in snow".into(),
            negative_prompt: None,
            settings: serde_json::json!({}),
            engine: "promptchan".into(),
            status_id,
            request_id: Some("abc123".into()),
            credits_used: 1,
            asset_id: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn view_maps_kind_and_status_to_wire_names() {
        let view = GenerationView::try_from(row(GenerationKind::Video, 2)).unwrap();
        assert_eq!(view.kind, "video");
        assert_eq!(view.status, "processing");
    }

    #[test]
    fn view_does_not_leak_the_provider_request_id() {
        let view = GenerationView::try_from(row(GenerationKind::Video, 2)).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("request_id").is_none());
        assert!(json.get("engine").is_none());
    }

    #[test]
    fn view_rejects_unknown_status_ids() {
        assert!(GenerationView::try_from(row(GenerationKind::Image, 9)).is_err());
    }

    #[test]
    fn request_settings_carry_all_knobs() {
        let req = CreateGenerationRequest {
            prompt: "p".into(),
            negative_prompt: None,
            kind: GenerationKind::Video,
            quality: Some("max".into()),
            style: None,
            aspect_ratio: Some("portrait".into()),
            audio: Some(true),
            seed: Some(42),
            restore_faces: None,
        };
        let settings = req.settings();
        assert_eq!(settings.quality.as_deref(), Some("max"));
        assert_eq!(settings.aspect_ratio.as_deref(), Some("portrait"));
        assert_eq!(settings.audio, Some(true));
        assert_eq!(settings.seed, Some(42));
    }
}
