//! Repository for the `assets` table.

use sqlx::PgPool;

use crate::models::asset::{Asset, NewAsset};

/// Column list for `assets` queries.
const COLUMNS: &str = "\
    id, user_id, kind_id, visibility_id, status_id, storage_key, \
    public_url, thumbnail_url, poster_url, prompt, metadata, \
    like_count, created_at";

/// Persists published assets.
pub struct AssetRepo;

impl AssetRepo {
    /// Insert a newly published asset. `like_count` starts at zero.
    pub async fn insert(pool: &PgPool, input: &NewAsset) -> Result<Asset, sqlx::Error> {
        let query = format!(
            "INSERT INTO assets \
                 (user_id, kind_id, visibility_id, status_id, storage_key, public_url, prompt, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Asset>(&query)
            .bind(input.user_id)
            .bind(input.kind_id)
            .bind(input.visibility_id)
            .bind(input.status_id)
            .bind(&input.storage_key)
            .bind(&input.public_url)
            .bind(&input.prompt)
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }
}
