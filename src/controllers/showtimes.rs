use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::models::Seat;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/showtimes/{showtime_id}/reserved-seats",
        get(get_reserved_seats),
    )
}

#[derive(Debug, Serialize)]
struct ReservedSeatResponse {
    pub id: i64,
    pub row: String,
    pub number: i32,
    pub label: String,
}

// GET /api/showtimes/{id}/reserved-seats
//
// Занятые места сеанса. Фронт перечитывает их после каждой попытки
// бронирования: свой кеш схемы зала он обязан считать устаревшим.
async fn get_reserved_seats(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if showtime_id <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "showtime_id должен быть > 0".to_string(),
        ));
    }

    let seats = sqlx::query_as::<_, Seat>(
        r#"
        SELECT s.id, s.screen_id, s.row_label, s.number
        FROM seats s
        JOIN seat_reservations r ON r.seat_id = s.id
        WHERE r.showtime_id = $1
        ORDER BY s.row_label, s.number
        "#,
    )
    .bind(showtime_id)
    .fetch_all(&state.db.pool)
    .await
    .map_err(|e| {
        tracing::error!("get_reserved_seats sql error: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Не удалось получить занятые места".to_string(),
        )
    })?;

    let payload: Vec<ReservedSeatResponse> = seats
        .into_iter()
        .map(|s| ReservedSeatResponse {
            id: s.id,
            label: s.label(),
            row: s.row_label,
            number: s.number,
        })
        .collect();

    Ok((StatusCode::OK, Json(payload)))
}
