pub mod generations;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /generations          create (POST), list own (GET)
/// /generations/{id}     observe one job (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/generations", generations::router())
}
