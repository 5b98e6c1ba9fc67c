// Application state for the API server
use crate::booking_queue::BookingQueue;
use crate::cache::AvailabilityCache;
use crate::query::QueryEngine;
use crate::registry::ConnectionRegistry;
use crate::reservation::ReservationPipeline;
use crate::store::{EventStore, PgEventStore, PgVenueStore};
use boxoffice_common::{Config, Result, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use redis::aio::MultiplexedConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub pipeline: Arc<ReservationPipeline>,
    pub registry: Arc<ConnectionRegistry>,
    pub events: Arc<dyn EventStore>,
    pub redis: MultiplexedConnection,
    pub db: PgPool,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub async fn new(config: &Config, metrics: PrometheusHandle) -> Result<Self> {
        let retry = RetryPolicy::default();

        let client = redis::Client::open(config.redis_url.as_str())?;
        let redis = retry
            .execute(|| {
                let client = client.clone();
                async move { client.get_multiplexed_async_connection().await }
            })
            .await?;
        info!("connected to redis at {}", config.redis_url);

        let db = retry
            .execute(|| {
                PgPoolOptions::new()
                    .max_connections(10)
                    .connect(&config.database_url)
            })
            .await?;
        info!("connected to postgres");

        let queue = Arc::new(
            retry
                .execute(|| BookingQueue::connect(&config.amqp_url, &config.booking_queue))
                .await?,
        );

        let events: Arc<dyn EventStore> = Arc::new(PgEventStore::new(db.clone()));
        let venues = Arc::new(PgVenueStore::new(db.clone()));
        let cache = Arc::new(AvailabilityCache::new(client, venues.clone()));
        let registry = Arc::new(ConnectionRegistry::new());

        let engine = Arc::new(QueryEngine::new(
            cache,
            events.clone(),
            venues.clone(),
            config.query_max_retries,
            Duration::from_millis(config.query_retry_delay_ms),
        ));
        let pipeline = Arc::new(ReservationPipeline::new(
            redis.clone(),
            venues,
            registry.clone(),
            queue,
            config.reservation_ttl_secs,
        ));

        Ok(Self {
            engine,
            pipeline,
            registry,
            events,
            redis,
            db,
            metrics,
        })
    }
}
