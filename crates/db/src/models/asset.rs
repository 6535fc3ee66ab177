//! Published asset entity and DTOs.

use lumen_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `assets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: DbId,
    pub user_id: DbId,
    pub kind_id: i16,
    pub visibility_id: StatusId,
    pub status_id: StatusId,
    pub storage_key: String,
    pub public_url: String,
    pub thumbnail_url: Option<String>,
    pub poster_url: Option<String>,
    /// Denormalized from the originating generation for display.
    pub prompt: String,
    pub metadata: Option<serde_json::Value>,
    /// Mutated only by the social collaborator, never by this subsystem.
    pub like_count: i32,
    pub created_at: Timestamp,
}

/// Media dimensions/size recorded on an asset when known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// Insert DTO for a newly published asset.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub user_id: DbId,
    pub kind_id: i16,
    pub visibility_id: StatusId,
    pub status_id: StatusId,
    pub storage_key: String,
    pub public_url: String,
    pub prompt: String,
    pub metadata: Option<serde_json::Value>,
}
