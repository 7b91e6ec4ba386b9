//! store
//!
//! Слой доступа к данным бронирования. Весь путь записи (пречек, цена,
//! вставка брони, вставка резервов, компенсирующее удаление) ходит в БД
//! только через трейт `BookingStore`, чтобы клиентскую компенсацию можно
//! было заменить на серверную атомарную операцию, не трогая вызывающий код.

pub mod postgres;

pub use postgres::PgBookingStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, SeatReservation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    // Сработал уникальный констрейнт (showtime_id, seat_id): место успел
    // занять конкурентный запрос уже после нашего пречека.
    #[error("unique constraint violation on (showtime_id, seat_id)")]
    UniqueViolation(sqlx::Error),
    #[error("partial write: expected {expected} rows, created {created}")]
    PartialWrite { expected: usize, created: usize },
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

// Классификация ошибок sqlx: нарушения уникальности отделяем от прочих,
// писатель броней по ним различает "конфликт" и "сбой бэкенда".
pub(crate) fn classify(e: sqlx::Error) -> StoreError {
    if e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        StoreError::UniqueViolation(e)
    } else {
        StoreError::Database(e)
    }
}

/// Данные новой брони; id и created_at назначает БД.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub showtime_id: i64,
    pub ticket_count: i32,
    pub total_minor: i64,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Какие из запрошенных мест уже зарезервированы на сеанс.
    async fn reserved_seats(
        &self,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError>;

    /// Цена места на сеанс в минорных единицах.
    /// `None` - сеанс не найден или цена не проставлена.
    async fn showtime_price(&self, showtime_id: i64) -> Result<Option<i64>, StoreError>;

    async fn insert_booking(&self, new: &NewBooking) -> Result<Booking, StoreError>;

    /// Вставляет по резерву на каждое место, все со ссылкой на бронь.
    async fn insert_reservations(
        &self,
        booking_id: i64,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<SeatReservation>, StoreError>;

    /// Компенсирующее удаление брони. Удаление уже отсутствующей брони
    /// не считается ошибкой.
    async fn delete_booking(&self, booking_id: i64) -> Result<(), StoreError>;
}
