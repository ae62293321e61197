//! Health check endpoint

use axum::Json;
use axum::extract::State;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    Json(serde_json::json!({
        "status": if database { "ok" } else { "degraded" },
        "service": "ward-cloud",
        "version": env!("CARGO_PKG_VERSION"),
        "maintenance": state.engine.snapshot().maintenance_mode,
    }))
}
