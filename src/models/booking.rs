use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Бронирование живёт без явного статуса: оно "настоящее" только когда
// у него есть свои seat_reservations. Бронь без резервов - это след
// неудавшейся компенсации, такие строки чистятся отдельно.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: Uuid,
    pub showtime_id: i64,
    pub ticket_count: i32,
    pub total_minor: i64,
    pub created_at: NaiveDateTime,
}

// Резерв одного места на один сеанс. Уникальность пары
// (showtime_id, seat_id) гарантирует констрейнт в БД.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeatReservation {
    pub id: i64,
    pub showtime_id: i64,
    pub seat_id: i64,
    pub booking_id: i64,
}
