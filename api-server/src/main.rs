// Boxoffice API server: ticket availability queries, reservation intake,
// and per-session websocket notifications.
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use boxoffice_api_server::{
    handlers::{health, metrics as metrics_handler, tickets},
    session::session_middleware,
    state::AppState,
    ws,
};
use boxoffice_common::Config;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "boxoffice_api_server=info,axum=info".to_string()),
        )
        .init();

    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let metrics_handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .expect("Failed to install Prometheus metrics recorder");

    let config = Config::from_env();
    info!("starting boxoffice API server v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(&config, metrics_handle).await?;

    // Booking consumers run in-process alongside the HTTP surface, pulling
    // from the durable queue the reserve endpoint publishes to. A consumer
    // that gives up on reconnecting is restarted from here.
    for i in 0..config.booking_consumers {
        let pipeline = state.pipeline.clone();
        let tag = format!("booking-consumer-{i}");
        tokio::spawn(async move {
            loop {
                if let Err(e) = pipeline.clone().run_consumer(tag.clone()).await {
                    error!("booking consumer {} exited: {}, restarting", tag, e);
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });
    }

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics_handler::prometheus_metrics))
        .route("/events/:event_id/tickets", get(tickets::list_tickets))
        .route(
            "/events/:event_id/tickets/reserve",
            post(tickets::reserve),
        )
        .route("/ws", get(ws::websocket_handler))
        .with_state(state)
        .layer(middleware::from_fn(session_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
