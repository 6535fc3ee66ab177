//! Generation job entity and DTOs.

use lumen_core::types::{DbId, GenerationKind, GenerationSettings, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{GenerationStatus, StatusId};

/// A row from the `generations` table.
///
/// Invariants (enforced by the orchestrator's guarded transitions, see
/// `lumen-orchestrator`): `asset_id` is set iff `status_id` is completed;
/// `error_message` is set iff failed; `request_id` is only ever set for
/// video jobs, after a successful provider submit.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Generation {
    pub id: DbId,
    pub user_id: DbId,
    pub kind_id: i16,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub settings: serde_json::Value,
    pub engine: String,
    pub status_id: StatusId,
    pub request_id: Option<String>,
    pub credits_used: i32,
    pub asset_id: Option<DbId>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Generation {
    /// Decode the `kind_id` column.
    pub fn kind(&self) -> Result<GenerationKind, lumen_core::error::CoreError> {
        GenerationKind::from_id(self.kind_id)
    }

    /// Decode the JSONB settings bag. Unknown keys are ignored.
    pub fn parsed_settings(&self) -> GenerationSettings {
        serde_json::from_value(self.settings.clone()).unwrap_or_default()
    }

    /// Current status as the typed enum. The column is CHECK-constrained
    /// to the valid range, so an unknown id indicates schema drift.
    pub fn status(&self) -> Result<GenerationStatus, lumen_core::error::CoreError> {
        match self.status_id {
            1 => Ok(GenerationStatus::Pending),
            2 => Ok(GenerationStatus::Processing),
            3 => Ok(GenerationStatus::Completed),
            4 => Ok(GenerationStatus::Failed),
            other => Err(lumen_core::error::CoreError::Internal(format!(
                "Unknown generation status id {other}"
            ))),
        }
    }
}

/// Insert DTO for a new generation job. Always starts in `Pending`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGeneration {
    pub user_id: DbId,
    pub kind: GenerationKind,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub settings: GenerationSettings,
    pub engine: String,
    pub credits_used: i32,
}
