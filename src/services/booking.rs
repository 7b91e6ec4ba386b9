//! booking.rs
//!
//! Сервисный слой бронирования мест. Две операции:
//!
//! 1.  **check_availability**: быстрый пречек занятости мест. Только чтение,
//!     результат совещательный: между пречеком и вставкой резервов другой
//!     запрос может успеть занять те же места. Последнее слово всегда за
//!     уникальным констрейнтом (showtime_id, seat_id) в БД.
//! 2.  **book_seats**: последовательность пречек -> цена -> бронь -> резервы.
//!     Транзакции поверх шагов нет, поэтому при сбое вставки резервов
//!     выполняется компенсирующее удаление брони. Если и оно не удалось,
//!     в БД остаётся бронь-сирота без резервов - это отдельная ошибка
//!     `CompensationFailed`, её нельзя терять в логах.

use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{money, Booking, SeatReservation};
use crate::store::{BookingStore, NewBooking, StoreError};

#[derive(Debug, Error)]
pub enum BookingError {
    // Чтение/запись во внешнее хранилище не удалось по техническим
    // причинам. Не ретраим, отдаём наверх как есть.
    #[error("data access failed: {0}")]
    DataAccess(#[source] StoreError),

    // Пречек нашёл уже занятые места. Несёт их id для сообщения юзеру.
    #[error("seats already reserved: {0:?}")]
    SeatConflict(Vec<i64>),

    #[error("no seats selected")]
    EmptySelection,

    #[error("no price for showtime {0}")]
    PricingUnavailable(i64),

    // Вставка брони не удалась. Резервы не вставлялись, компенсировать нечего.
    #[error("failed to create booking")]
    BookingCreateFailed(#[source] StoreError),

    // Вставка резервов не удалась (сбой, частичная вставка или поздний
    // конфликт уникальности), бронь удалена компенсацией. БД консистентна.
    #[error("failed to reserve seats (conflict: {conflict})")]
    SeatReservationFailed {
        conflict: bool,
        #[source]
        source: StoreError,
    },

    // Вставка резервов не удалась И компенсирующее удаление тоже.
    // В БД осталась бронь-сирота, нужна внешняя сверка.
    #[error("booking {booking_id} orphaned: reservation insert and cleanup both failed")]
    CompensationFailed {
        booking_id: i64,
        reservation: StoreError,
        delete: StoreError,
    },
}

/// Успешный результат `book_seats`: бронь и все её резервы.
#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub seat_reservations: Vec<SeatReservation>,
}

#[derive(Clone)]
pub struct BookingService<S> {
    store: S,
}

impl<S: BookingStore> BookingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Возвращает подмножество `seat_ids`, уже занятое на сеанс.
    /// Ничего не мутирует; пустой вектор - все места свободны.
    pub async fn check_availability(
        &self,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<i64>, BookingError> {
        self.store
            .reserved_seats(showtime_id, seat_ids)
            .await
            .map_err(BookingError::DataAccess)
    }

    /// Создаёт бронь и по резерву на каждое место. Операция намеренно
    /// НЕ идемпотентна: повторный вызов с теми же аргументами создаёт
    /// вторую бронь (или падает с конфликтом, если места уже заняты).
    pub async fn book_seats(
        &self,
        user_id: Uuid,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<BookingConfirmation, BookingError> {
        if seat_ids.is_empty() {
            return Err(BookingError::EmptySelection);
        }

        // 1. Пречек: быстрый отказ в очевидном случае.
        let taken = self.check_availability(showtime_id, seat_ids).await?;
        if !taken.is_empty() {
            return Err(BookingError::SeatConflict(taken));
        }

        // 2. Цена места на сеанс.
        let price_minor = self
            .store
            .showtime_price(showtime_id)
            .await
            .map_err(BookingError::DataAccess)?
            .ok_or(BookingError::PricingUnavailable(showtime_id))?;

        // 3. Итог строго в минорных единицах, никакой плавающей точки.
        let total_minor = money::total_minor(price_minor, seat_ids.len())
            .ok_or(BookingError::PricingUnavailable(showtime_id))?;

        // 4. Бронь.
        let booking = self
            .store
            .insert_booking(&NewBooking {
                user_id,
                showtime_id,
                ticket_count: seat_ids.len() as i32,
                total_minor,
            })
            .await
            .map_err(BookingError::BookingCreateFailed)?;

        // 5. Резервы. Успех - ровно по строке на каждое место;
        //    всё остальное откатываем компенсацией.
        let seat_reservations = match self
            .store
            .insert_reservations(booking.id, showtime_id, seat_ids)
            .await
        {
            Ok(rows) if rows.len() == seat_ids.len() => rows,
            Ok(rows) => {
                let cause = StoreError::PartialWrite {
                    expected: seat_ids.len(),
                    created: rows.len(),
                };
                return Err(self.compensate(booking.id, cause).await);
            }
            Err(cause) => return Err(self.compensate(booking.id, cause).await),
        };

        Ok(BookingConfirmation {
            booking,
            seat_reservations,
        })
    }

    // Откат шага 4: пробуем удалить бронь, оставшуюся без резервов.
    async fn compensate(&self, booking_id: i64, reservation: StoreError) -> BookingError {
        warn!(
            "reservation insert failed for booking {}, deleting it: {:?}",
            booking_id, reservation
        );

        match self.store.delete_booking(booking_id).await {
            Ok(()) => BookingError::SeatReservationFailed {
                conflict: reservation.is_unique_violation(),
                source: reservation,
            },
            Err(delete) => {
                // Инцидент целостности данных: бронь-сирота осталась в БД.
                error!(
                    "compensation failed, booking {} orphaned: reservation error {:?}, delete error {:?}",
                    booking_id, reservation, delete
                );
                BookingError::CompensationFailed {
                    booking_id,
                    reservation,
                    delete,
                }
            }
        }
    }
}
