//! Тесты пути записи бронирования поверх in-memory стора.
//! Стор воспроизводит поведение Postgres в важных местах: уникальный
//! констрейнт (showtime_id, seat_id), атомарность множественной вставки,
//! каскадное удаление резервов вместе с бронью.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;
use uuid::Uuid;

use cinema_booking::models::{money, Booking, SeatReservation};
use cinema_booking::services::booking::{BookingError, BookingService};
use cinema_booking::store::{BookingStore, NewBooking, StoreError};

const SHOWTIME: i64 = 10;

/* ---------- in-memory store ---------- */

#[derive(Default)]
struct Failpoints {
    // пречек возвращает устаревший снимок "всё свободно"
    stale_precheck: bool,
    fail_precheck: bool,
    fail_booking_insert: bool,
    fail_reservation_insert: bool,
    partial_reservation_insert: bool,
    fail_delete: bool,
}

#[derive(Default)]
struct Inner {
    next_booking_id: i64,
    next_reservation_id: i64,
    prices: HashMap<i64, Option<i64>>,
    bookings: Vec<Booking>,
    reservations: Vec<SeatReservation>,
}

#[derive(Default)]
struct MemoryStore {
    inner: Mutex<Inner>,
    fail: Failpoints,
}

fn db_error() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

fn unique_violation() -> StoreError {
    StoreError::UniqueViolation(sqlx::Error::Protocol(
        "duplicate key value violates unique constraint \
         \"seat_reservations_showtime_id_seat_id_key\""
            .into(),
    ))
}

impl MemoryStore {
    fn new() -> Self {
        Self::default()
    }

    fn with_price(self, showtime_id: i64, price_minor: i64) -> Self {
        self.inner
            .lock()
            .unwrap()
            .prices
            .insert(showtime_id, Some(price_minor));
        self
    }

    fn with_null_price(self, showtime_id: i64) -> Self {
        self.inner.lock().unwrap().prices.insert(showtime_id, None);
        self
    }

    fn with_fail(mut self, f: impl FnOnce(&mut Failpoints)) -> Self {
        f(&mut self.fail);
        self
    }

    // резерв, оставленный чужой бронью
    fn seed_reservation(&self, showtime_id: i64, seat_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_reservation_id += 1;
        let id = inner.next_reservation_id;
        inner.reservations.push(SeatReservation {
            id,
            showtime_id,
            seat_id,
            booking_id: 999,
        });
    }

    // имитация отмены: все резервы сняты, брони остаются
    fn clear_reservations(&self) {
        self.inner.lock().unwrap().reservations.clear();
    }

    fn bookings(&self) -> Vec<Booking> {
        self.inner.lock().unwrap().bookings.clone()
    }

    fn reservations(&self) -> Vec<SeatReservation> {
        self.inner.lock().unwrap().reservations.clone()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn reserved_seats(
        &self,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        if self.fail.fail_precheck {
            return Err(db_error());
        }
        if self.fail.stale_precheck {
            return Ok(Vec::new());
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reservations
            .iter()
            .filter(|r| r.showtime_id == showtime_id && seat_ids.contains(&r.seat_id))
            .map(|r| r.seat_id)
            .collect())
    }

    async fn showtime_price(&self, showtime_id: i64) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.prices.get(&showtime_id).copied().flatten())
    }

    async fn insert_booking(&self, new: &NewBooking) -> Result<Booking, StoreError> {
        if self.fail.fail_booking_insert {
            return Err(db_error());
        }
        let mut inner = self.inner.lock().unwrap();
        inner.next_booking_id += 1;
        let booking = Booking {
            id: inner.next_booking_id,
            user_id: new.user_id,
            showtime_id: new.showtime_id,
            ticket_count: new.ticket_count,
            total_minor: new.total_minor,
            created_at: chrono::Utc::now().naive_utc(),
        };
        inner.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn insert_reservations(
        &self,
        booking_id: i64,
        showtime_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<SeatReservation>, StoreError> {
        if self.fail.fail_reservation_insert {
            return Err(db_error());
        }
        let mut inner = self.inner.lock().unwrap();

        // уникальный констрейнт: конфликт валит весь INSERT, без частичных вставок
        let conflict = inner.reservations.iter().any(|r| {
            r.showtime_id == showtime_id && seat_ids.contains(&r.seat_id)
        });
        if conflict {
            return Err(unique_violation());
        }

        let take = if self.fail.partial_reservation_insert {
            1
        } else {
            seat_ids.len()
        };

        let mut created = Vec::new();
        for &seat_id in &seat_ids[..take] {
            inner.next_reservation_id += 1;
            let id = inner.next_reservation_id;
            let row = SeatReservation {
                id,
                showtime_id,
                seat_id,
                booking_id,
            };
            inner.reservations.push(row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn delete_booking(&self, booking_id: i64) -> Result<(), StoreError> {
        if self.fail.fail_delete {
            return Err(db_error());
        }
        let mut inner = self.inner.lock().unwrap();
        inner.bookings.retain(|b| b.id != booking_id);
        // ON DELETE CASCADE
        inner.reservations.retain(|r| r.booking_id != booking_id);
        Ok(())
    }
}

fn service(store: MemoryStore) -> BookingService<MemoryStore> {
    BookingService::new(store)
}

fn user() -> Uuid {
    Uuid::new_v4()
}

/* ---------- happy path ---------- */

#[tokio::test]
async fn books_free_seats_and_reserves_each_one() {
    // сеанс по 10.00, два свободных места
    let svc = service(MemoryStore::new().with_price(SHOWTIME, 1000));

    let confirmation = svc
        .book_seats(user(), SHOWTIME, &[1, 2])
        .await
        .expect("booking should succeed");

    assert_eq!(confirmation.booking.ticket_count, 2);
    assert_eq!(confirmation.booking.total_minor, 2000);
    assert_eq!(money::format_minor(confirmation.booking.total_minor), "20.00");

    assert_eq!(confirmation.seat_reservations.len(), 2);
    for r in &confirmation.seat_reservations {
        assert_eq!(r.booking_id, confirmation.booking.id);
        assert_eq!(r.showtime_id, SHOWTIME);
    }

    assert_eq!(svc.store().bookings().len(), 1);
    assert_eq!(svc.store().reservations().len(), 2);
}

#[tokio::test]
async fn exact_total_for_fractional_price() {
    // 12.50 x 3 = 37.50, без дрейфа плавающей точки
    let svc = service(MemoryStore::new().with_price(SHOWTIME, 1250));

    let confirmation = svc
        .book_seats(user(), SHOWTIME, &[1, 2, 3])
        .await
        .expect("booking should succeed");

    assert_eq!(confirmation.booking.total_minor, 3750);
    assert_eq!(money::format_minor(confirmation.booking.total_minor), "37.50");
}

proptest! {
    #[test]
    fn total_never_drifts(price_minor in 0i64..=1_000_000, seats in 1usize..=10) {
        let total = money::total_minor(price_minor, seats).unwrap();
        prop_assert_eq!(total, price_minor * seats as i64);
    }
}

/* ---------- precheck ---------- */

#[tokio::test]
async fn rejects_already_reserved_seats_without_writing() {
    let svc = service(MemoryStore::new().with_price(SHOWTIME, 1000));
    svc.store().seed_reservation(SHOWTIME, 1);

    let err = svc.book_seats(user(), SHOWTIME, &[1, 2]).await.unwrap_err();

    match err {
        BookingError::SeatConflict(seats) => assert_eq!(seats, vec![1]),
        other => panic!("expected SeatConflict, got {:?}", other),
    }

    // ничего не создано: только чужой резерв
    assert!(svc.store().bookings().is_empty());
    assert_eq!(svc.store().reservations().len(), 1);
}

#[tokio::test]
async fn check_availability_reports_taken_subset() {
    let svc = service(MemoryStore::new().with_price(SHOWTIME, 1000));
    svc.store().seed_reservation(SHOWTIME, 3);
    svc.store().seed_reservation(SHOWTIME, 5);

    let taken = svc
        .check_availability(SHOWTIME, &[1, 3, 5])
        .await
        .expect("read should succeed");

    assert_eq!(taken, vec![3, 5]);
}

#[tokio::test]
async fn precheck_read_failure_is_data_access_error() {
    let svc = service(
        MemoryStore::new()
            .with_price(SHOWTIME, 1000)
            .with_fail(|f| f.fail_precheck = true),
    );

    let err = svc.book_seats(user(), SHOWTIME, &[1]).await.unwrap_err();

    assert!(matches!(err, BookingError::DataAccess(_)));
    assert!(svc.store().bookings().is_empty());
    assert!(svc.store().reservations().is_empty());
}

/* ---------- pricing ---------- */

#[tokio::test]
async fn pricing_unavailable_for_unknown_showtime() {
    let svc = service(MemoryStore::new());

    let err = svc.book_seats(user(), SHOWTIME, &[1]).await.unwrap_err();

    assert!(matches!(err, BookingError::PricingUnavailable(SHOWTIME)));
    assert!(svc.store().bookings().is_empty());
}

#[tokio::test]
async fn pricing_unavailable_for_null_price() {
    let svc = service(MemoryStore::new().with_null_price(SHOWTIME));

    let err = svc.book_seats(user(), SHOWTIME, &[1]).await.unwrap_err();

    assert!(matches!(err, BookingError::PricingUnavailable(SHOWTIME)));
}

#[tokio::test]
async fn empty_selection_rejected() {
    let svc = service(MemoryStore::new().with_price(SHOWTIME, 1000));

    let err = svc.book_seats(user(), SHOWTIME, &[]).await.unwrap_err();

    assert!(matches!(err, BookingError::EmptySelection));
    assert!(svc.store().bookings().is_empty());
}

/* ---------- failures and compensation ---------- */

#[tokio::test]
async fn booking_insert_failure_needs_no_compensation() {
    let svc = service(
        MemoryStore::new()
            .with_price(SHOWTIME, 1000)
            .with_fail(|f| f.fail_booking_insert = true),
    );

    let err = svc.book_seats(user(), SHOWTIME, &[1, 2]).await.unwrap_err();

    assert!(matches!(err, BookingError::BookingCreateFailed(_)));
    assert!(svc.store().bookings().is_empty());
    assert!(svc.store().reservations().is_empty());
}

#[tokio::test]
async fn reservation_failure_compensates_booking() {
    let svc = service(
        MemoryStore::new()
            .with_price(SHOWTIME, 1000)
            .with_fail(|f| f.fail_reservation_insert = true),
    );

    let err = svc.book_seats(user(), SHOWTIME, &[1, 2]).await.unwrap_err();

    match err {
        BookingError::SeatReservationFailed { conflict, .. } => assert!(!conflict),
        other => panic!("expected SeatReservationFailed, got {:?}", other),
    }

    // компенсация удалила бронь: наблюдаемо "всё или ничего"
    assert!(svc.store().bookings().is_empty());
    assert!(svc.store().reservations().is_empty());
}

#[tokio::test]
async fn partial_reservation_insert_compensates_booking() {
    let svc = service(
        MemoryStore::new()
            .with_price(SHOWTIME, 1000)
            .with_fail(|f| f.partial_reservation_insert = true),
    );

    let err = svc.book_seats(user(), SHOWTIME, &[1, 2, 3]).await.unwrap_err();

    match err {
        BookingError::SeatReservationFailed { conflict, source } => {
            assert!(!conflict);
            assert!(matches!(
                source,
                StoreError::PartialWrite {
                    expected: 3,
                    created: 1
                }
            ));
        }
        other => panic!("expected SeatReservationFailed, got {:?}", other),
    }

    // каскадное удаление брони убрало и частично вставленные резервы
    assert!(svc.store().bookings().is_empty());
    assert!(svc.store().reservations().is_empty());
}

#[tokio::test]
async fn compensation_failure_leaves_orphaned_booking() {
    let svc = service(
        MemoryStore::new()
            .with_price(SHOWTIME, 1000)
            .with_fail(|f| {
                f.fail_reservation_insert = true;
                f.fail_delete = true;
            }),
    );

    let err = svc.book_seats(user(), SHOWTIME, &[1]).await.unwrap_err();

    let orphan_id = match err {
        BookingError::CompensationFailed { booking_id, .. } => booking_id,
        other => panic!("expected CompensationFailed, got {:?}", other),
    };

    // документированное исключение из "всё или ничего":
    // бронь-сирота осталась, резервов у неё нет
    let bookings = svc.store().bookings();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].id, orphan_id);
    assert!(svc.store().reservations().is_empty());
}

/* ---------- idempotence and races ---------- */

#[tokio::test]
async fn rebooking_freed_seats_creates_distinct_booking() {
    let svc = service(MemoryStore::new().with_price(SHOWTIME, 1000));
    let u = user();

    let first = svc.book_seats(u, SHOWTIME, &[1]).await.expect("first booking");

    // места освободились (например, отмена) - тот же вызов создаёт новую бронь
    svc.store().clear_reservations();

    let second = svc.book_seats(u, SHOWTIME, &[1]).await.expect("second booking");

    assert_ne!(first.booking.id, second.booking.id);
    assert_eq!(svc.store().bookings().len(), 2);
}

#[tokio::test]
async fn concurrent_race_has_single_winner() {
    // оба вызова проходят пречек по устаревшему снимку,
    // арбитром выступает уникальный констрейнт на вставке
    let svc = service(
        MemoryStore::new()
            .with_price(SHOWTIME, 1000)
            .with_fail(|f| f.stale_precheck = true),
    );

    let (a, b) = tokio::join!(
        svc.book_seats(user(), SHOWTIME, &[7]),
        svc.book_seats(user(), SHOWTIME, &[7]),
    );

    let (winner, loser) = match (a, b) {
        (Ok(w), Err(l)) => (w, l),
        (Err(l), Ok(w)) => (w, l),
        (Ok(_), Ok(_)) => panic!("both bookings won the race"),
        (Err(a), Err(b)) => panic!("both bookings failed: {:?} / {:?}", a, b),
    };

    match loser {
        BookingError::SeatReservationFailed { conflict, .. } => assert!(conflict),
        other => panic!("loser should hit the unique constraint, got {:?}", other),
    }

    // ровно один резерв на (сеанс, место) и одна бронь:
    // проигравшая сторона скомпенсирована
    let reservations = svc.store().reservations();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].seat_id, 7);
    assert_eq!(reservations[0].booking_id, winner.booking.id);
    assert_eq!(svc.store().bookings().len(), 1);
}
