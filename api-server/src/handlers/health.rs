// Health check handler
use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let mut conn = state.redis.clone();
    let redis_healthy = redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .is_ok();
    let db_healthy = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    let status = if redis_healthy && db_healthy {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "service": "boxoffice-api-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
        "components": {
            "redis": if redis_healthy { "healthy" } else { "unhealthy" },
            "postgres": if db_healthy { "healthy" } else { "unhealthy" }
        }
    }))
}
