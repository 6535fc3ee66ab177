use serde::{Deserialize, Serialize};

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// What a generation job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Image,
    Video,
}

impl GenerationKind {
    /// Database kind ID (SMALLINT).
    pub fn id(self) -> i16 {
        match self {
            Self::Image => 1,
            Self::Video => 2,
        }
    }

    /// Parse from the database kind ID.
    pub fn from_id(id: i16) -> Result<Self, crate::error::CoreError> {
        match id {
            1 => Ok(Self::Image),
            2 => Ok(Self::Video),
            other => Err(crate::error::CoreError::Validation(format!(
                "Unknown generation kind id {other}"
            ))),
        }
    }

    /// Lowercase wire name (`image` / `video`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// User-supplied knobs for a generation, stored as JSONB on the job row.
///
/// All fields are optional; the provider applies its own defaults for
/// anything omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Provider style preset, e.g. `cinematic_xl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Quality tier name (`standard` / `high` / `max`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Aspect ratio (video only), e.g. `portrait` / `wide`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Whether to render an audio track (video only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    /// Deterministic seed for reproducible output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Run the provider's face-restoration pass (image only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_faces: Option<bool>,
}
