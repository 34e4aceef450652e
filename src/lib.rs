pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod storage;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use services::{
    BackgroundPublisher, BookingLedger, BookingQueryService, BroadcastPublisher, ConsistencyAuditor, EventPublisher, FanoutPublisher,
    RedisStreamPublisher, ReservationEngine, ScopeLocks, SeatMap, ShowtimeRegistry,
};
use storage::{InMemoryStore, PgStore, Store};

const EVENT_QUEUE_CAPACITY: usize = 10_000;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn Store>,
    pub seat_map: SeatMap,
    pub registry: ShowtimeRegistry,
    pub engine: ReservationEngine,
    pub ledger: BookingLedger,
    pub queries: BookingQueryService,
    /// Внутренняя шина, на неё подписываются уведомления и лояльность.
    pub events: BroadcastPublisher,
}

impl AppState {
    /// Поднимает хранилище и транспорт событий по конфигурации.
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn Store> = match &config.database {
            Some(db_config) => {
                let db = database::Database::connect(db_config).await?;
                db.migrate().await?;
                Arc::new(PgStore::new(&db))
            }
            None => {
                warn!("DATABASE_URL is not set, bookings are kept in memory only");
                Arc::new(InMemoryStore::new())
            }
        };

        let events = BroadcastPublisher::default();
        let mut publisher = FanoutPublisher::new().with(Arc::new(events.clone()));
        if let Some(redis_config) = &config.redis {
            let redis = redis_client::RedisClient::connect(redis_config).await?;
            let stream = Arc::new(RedisStreamPublisher::new(redis, redis_config.events_stream.clone()));
            // XADD с повторами не должен задерживать ответ на бронь
            publisher = publisher.with(Arc::new(BackgroundPublisher::spawn(stream, EVENT_QUEUE_CAPACITY)));
        }

        Ok(Self::assemble(config, store, events, Arc::new(publisher)))
    }

    /// Состояние поверх готового хранилища; события только во внутреннюю шину.
    pub fn with_store(config: config::Config, store: Arc<dyn Store>) -> Arc<Self> {
        let events = BroadcastPublisher::default();
        let publisher: Arc<dyn EventPublisher> = Arc::new(events.clone());
        Self::assemble(config, store, events, publisher)
    }

    fn assemble(
        config: config::Config,
        store: Arc<dyn Store>,
        events: BroadcastPublisher,
        publisher: Arc<dyn EventPublisher>,
    ) -> Arc<Self> {
        let booking = config.booking.clone();
        // Одни и те же области сеансов для движка и реестра
        let showtime_locks = Arc::new(ScopeLocks::new(booking.scope_timeout));

        Arc::new(Self {
            seat_map: SeatMap::new(store.clone()),
            registry: ShowtimeRegistry::new(store.clone(), showtime_locks.clone(), publisher.clone(), booking.clone()),
            engine: ReservationEngine::new(store.clone(), showtime_locks, publisher, booking),
            ledger: BookingLedger::new(store.clone()),
            queries: BookingQueryService::new(store.clone()),
            store,
            events,
            config,
        })
    }

    pub fn auditor(&self) -> ConsistencyAuditor {
        ConsistencyAuditor::new(self.store.clone())
    }
}

/// Полный роутер приложения: `/health` и API под `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
