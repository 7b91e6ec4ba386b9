pub mod config;
pub mod controllers;
pub mod database;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::booking::BookingService;
use store::PgBookingStore;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub bookings: BookingService<PgBookingStore>,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        let bookings = BookingService::new(PgBookingStore::new(db.pool.clone()));

        Ok(Arc::new(Self {
            db,
            config,
            bookings,
        }))
    }
}
