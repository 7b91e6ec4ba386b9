use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::sync::Arc;

use crate::models::{money, Booking, SeatReservation};
use crate::services::booking::{BookingConfirmation, BookingError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings", get(get_user_bookings))
}

/* ---------- POST /api/bookings ---------- */

#[derive(Debug, Deserialize)]
struct BookSeatsRequest {
    pub showtime_id: i64,
    pub seat_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct BookingView {
    pub id: i64,
    pub showtime_id: i64,
    pub ticket_count: i32,
    pub total_minor: i64,
    pub total: String,
    pub created_at: chrono::NaiveDateTime,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        BookingView {
            id: b.id,
            showtime_id: b.showtime_id,
            ticket_count: b.ticket_count,
            // форматированная сумма - только для отображения
            total: money::format_minor(b.total_minor),
            total_minor: b.total_minor,
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct BookSeatsResponse {
    pub booking: BookingView,
    pub seat_reservations: Vec<SeatReservation>,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: crate::middleware::AuthUser,
    Json(req): Json<BookSeatsRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if req.showtime_id <= 0 {
        return Err(bad_request("showtime_id должен быть > 0"));
    }
    if req.seat_ids.is_empty() {
        return Err(bad_request("Не выбраны места"));
    }
    if req.seat_ids.iter().any(|&id| id <= 0) {
        return Err(bad_request("seat_ids должны быть > 0"));
    }

    // Сервис ждёт дедуплицированный список мест
    let mut seat_ids = req.seat_ids;
    seat_ids.sort_unstable();
    seat_ids.dedup();

    match state
        .bookings
        .book_seats(user.id, req.showtime_id, &seat_ids)
        .await
    {
        Ok(BookingConfirmation {
            booking,
            seat_reservations,
        }) => Ok((
            StatusCode::CREATED,
            Json(BookSeatsResponse {
                booking: booking.into(),
                seat_reservations,
            }),
        )),
        Err(e) => Err(booking_error_response(e)),
    }
}

fn bad_request(msg: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": msg })),
    )
}

// Маппинг ошибок сервиса на HTTP. Конфликт из пречека и поздний конфликт
// уникальности выглядят для клиента одинаково - 409 с просьбой выбрать
// другие места.
fn booking_error_response(err: BookingError) -> (StatusCode, Json<serde_json::Value>) {
    match err {
        BookingError::EmptySelection => bad_request("Не выбраны места"),
        BookingError::SeatConflict(seats) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "Места уже заняты, выберите другие",
                "seats": seats,
            })),
        ),
        BookingError::SeatReservationFailed { conflict: true, .. } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "Места уже заняты, выберите другие",
            })),
        ),
        BookingError::PricingUnavailable(showtime_id) => {
            tracing::warn!("no price for showtime {}", showtime_id);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": "Не удалось получить цену сеанса" })),
            )
        }
        // CompensationFailed уже залогирован сервисом как инцидент
        // целостности; клиенту отдаём тот же общий ответ, что и для
        // остальных сбоев.
        e => {
            tracing::error!("booking failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Не удалось создать бронирование, попробуйте ещё раз"
                })),
            )
        }
    }
}

/* ---------- GET /api/bookings ---------- */

#[derive(Debug, Serialize)]
struct BookingSeat {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Serialize)]
struct UserBookingResponse {
    pub id: i64,
    pub showtime_id: i64,
    pub ticket_count: i32,
    pub total_minor: i64,
    pub total: String,
    pub seats: Vec<BookingSeat>,
}

async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: crate::middleware::AuthUser,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = sqlx::query(
        r#"
        SELECT b.id as bid, b.showtime_id as stid, b.ticket_count as tickets,
               b.total_minor as total, s.id as sid, s.row_label as row_label,
               s.number as seat_number
        FROM bookings b
        LEFT JOIN seat_reservations r ON r.booking_id = b.id
        LEFT JOIN seats s ON s.id = r.seat_id
        WHERE b.user_id = $1
        ORDER BY b.created_at DESC, s.row_label, s.number
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db.pool)
    .await;

    let rows = rows.map_err(|e| {
        tracing::error!("get_user_bookings sql error: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Не удалось получить список бронирований".to_string(),
        )
    })?;

    use std::collections::BTreeMap;
    let mut map: BTreeMap<i64, UserBookingResponse> = BTreeMap::new();
    for r in rows {
        let bid: i64 = r.get("bid");
        let entry = map.entry(bid).or_insert_with(|| UserBookingResponse {
            id: bid,
            showtime_id: r.get("stid"),
            ticket_count: r.get("tickets"),
            total_minor: r.get("total"),
            total: money::format_minor(r.get::<i64, _>("total")),
            seats: Vec::new(),
        });
        // LEFT JOIN: у брони-сироты мест нет, sid будет NULL
        if let Ok(sid) = r.try_get::<i64, _>("sid") {
            let row_label: String = r.get("row_label");
            let seat_number: i32 = r.get("seat_number");
            entry.seats.push(BookingSeat {
                id: sid,
                label: format!("{}{}", row_label, seat_number),
            });
        }
    }

    let resp: Vec<UserBookingResponse> = map.into_values().collect();

    Ok((StatusCode::OK, Json(resp)))
}
