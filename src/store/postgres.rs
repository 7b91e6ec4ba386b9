use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{classify, BookingStore, NewBooking, StoreError};
use crate::models::{Booking, SeatReservation};

#[derive(Clone)]
pub struct PgBookingStore {
    pool: Pool<Postgres>,
}

impl PgBookingStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn reserved_seats(
        &self,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT seat_id FROM seat_reservations
             WHERE showtime_id = $1 AND seat_id = ANY($2)"
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn showtime_price(&self, showtime_id: i64) -> Result<Option<i64>, StoreError> {
        // Внешний Option - сеанс не найден, внутренний - цена NULL.
        // Для вызывающего оба случая означают "цены нет".
        let price: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT price_minor FROM showtimes WHERE id = $1"
        )
        .bind(showtime_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(price.flatten())
    }

    async fn insert_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (user_id, showtime_id, ticket_count, total_minor)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, showtime_id, ticket_count, total_minor, created_at"
        )
        .bind(new.user_id)
        .bind(new.showtime_id)
        .bind(new.ticket_count)
        .bind(new.total_minor)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn insert_reservations(
        &self,
        booking_id: i64,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<SeatReservation>, StoreError> {
        // Один INSERT на все места: при нарушении уникальности не
        // вставится ни одной строки, частичных вставок Postgres не даёт.
        sqlx::query_as::<_, SeatReservation>(
            "INSERT INTO seat_reservations (showtime_id, seat_id, booking_id)
             SELECT $1, t.seat_id, $2 FROM UNNEST($3::bigint[]) AS t(seat_id)
             RETURNING id, showtime_id, seat_id, booking_id"
        )
        .bind(showtime_id)
        .bind(booking_id)
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn delete_booking(&self, booking_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
