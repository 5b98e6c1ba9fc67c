// Prometheus metrics endpoint
use crate::state::AppState;
use axum::extract::State;

pub async fn prometheus_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
