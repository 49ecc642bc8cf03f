// libs/booking-cell/tests/reservation_test.rs
use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use booking_cell::models::{
    Appointment, AppointmentStatus, AvailabilityRule, BookingError, SlotLock,
};
use booking_cell::services::ReservationManager;
use booking_cell::stores::{LockStore, MemoryStore};

// 2025-06-16 is a Monday
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
}

fn dt(hour: u32, minute: u32) -> DateTime<Utc> {
    monday().and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

fn monday_rule(clinic_id: Uuid) -> AvailabilityRule {
    AvailabilityRule {
        id: Uuid::new_v4(),
        clinic_id,
        day_of_week: 1,
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        break_start: None,
        break_end: None,
        slot_duration_minutes: 30,
        buffer_minutes: 0,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn setup(clinic_id: Uuid) -> (Arc<MemoryStore>, Arc<ReservationManager>) {
    let store = Arc::new(MemoryStore::new());
    store.add_rule(monday_rule(clinic_id)).await;
    let manager = Arc::new(ReservationManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        5,
    ));
    (store, manager)
}

#[tokio::test]
async fn acquire_creates_a_time_boxed_hold() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();

    assert_eq!(lock.clinic_id, clinic_id);
    assert_eq!(lock.expires_at, now + Duration::minutes(5));
    assert_eq!(lock.converted_to_appointment_id, None);
    assert_eq!(store.lock_count().await, 1);
}

#[tokio::test]
async fn acquire_fails_on_booked_interval() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;

    store
        .add_appointment(Appointment {
            id: Uuid::new_v4(),
            clinic_id,
            patient_name: "Jane Doe".to_string(),
            patient_phone: "+31612345678".to_string(),
            patient_email: None,
            treatment_id: None,
            notes: None,
            start_datetime: dt(9, 0),
            end_datetime: dt(9, 30),
            status: AppointmentStatus::Confirmed,
            created_at: dt(8, 0),
            updated_at: dt(8, 0),
        })
        .await;

    let result = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, dt(8, 0))
        .await;
    assert_matches!(result, Err(BookingError::SlotUnavailable));
}

#[tokio::test]
async fn second_acquire_for_same_interval_fails() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();
    let second = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await;

    assert_matches!(second, Err(BookingError::SlotUnavailable));
}

#[tokio::test]
async fn concurrent_acquires_admit_exactly_one_winner() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let (first, second) = tokio::join!(
        manager.acquire(clinic_id, dt(9, 0), dt(9, 30), None, now),
        manager.acquire(clinic_id, dt(9, 0), dt(9, 30), None, now),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let loser = if first.is_ok() { second } else { first };
    assert_matches!(loser, Err(BookingError::SlotUnavailable));
    assert_eq!(store.lock_count().await, 1);
}

#[tokio::test]
async fn misaligned_intervals_are_rejected() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    // Off-grid start
    let result = manager
        .acquire(clinic_id, dt(9, 10), dt(9, 40), None, now)
        .await;
    assert_matches!(result, Err(BookingError::ValidationError(_)));

    // Wrong duration
    let result = manager
        .acquire(clinic_id, dt(9, 0), dt(10, 0), None, now)
        .await;
    assert_matches!(result, Err(BookingError::ValidationError(_)));

    // Outside clinic hours
    let result = manager
        .acquire(clinic_id, dt(8, 0), dt(8, 30), None, now)
        .await;
    assert_matches!(result, Err(BookingError::ValidationError(_)));

    // Inverted interval
    let result = manager
        .acquire(clinic_id, dt(9, 30), dt(9, 0), None, now)
        .await;
    assert_matches!(result, Err(BookingError::ValidationError(_)));
}

#[tokio::test]
async fn past_intervals_are_rejected() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;

    let result = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, dt(9, 5))
        .await;
    assert_matches!(result, Err(BookingError::ValidationError(_)));
}

#[tokio::test]
async fn closed_day_is_rejected() {
    let clinic_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let manager = ReservationManager::new(store.clone(), store.clone(), store, 5);

    let result = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, dt(8, 0))
        .await;
    assert_matches!(result, Err(BookingError::ValidationError(_)));
}

#[tokio::test]
async fn expired_lock_does_not_block_a_new_acquire() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;

    // Stale hold from an abandoned flow, never swept
    store
        .add_lock(SlotLock {
            id: Uuid::new_v4(),
            clinic_id,
            start_datetime: dt(9, 0),
            end_datetime: dt(9, 30),
            locked_by_user_id: None,
            expires_at: dt(7, 30),
            converted_to_appointment_id: None,
            created_at: dt(7, 25),
        })
        .await;

    let result = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, dt(8, 0))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn convert_binds_the_lock_and_makes_it_inert() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;
    let now = dt(8, 0);
    let appointment_id = Uuid::new_v4();

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();
    manager.convert(lock.id, appointment_id, now).await.unwrap();

    let stored = store.get_lock(lock.id).await.unwrap().unwrap();
    assert_eq!(stored.converted_to_appointment_id, Some(appointment_id));

    // The converted lock no longer occupies the interval on its own
    let reacquired = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await;
    assert!(reacquired.is_ok());
}

#[tokio::test]
async fn convert_after_ttl_fails() {
    // acquire at T, convert attempted at T+6min with a 5-minute TTL
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, dt(8, 0))
        .await
        .unwrap();

    let result = manager
        .convert(lock.id, Uuid::new_v4(), dt(8, 6))
        .await;
    assert_matches!(result, Err(BookingError::LockExpired));
}

#[tokio::test]
async fn convert_is_single_shot() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();
    manager.convert(lock.id, Uuid::new_v4(), now).await.unwrap();

    let again = manager.convert(lock.id, Uuid::new_v4(), now).await;
    assert_matches!(again, Err(BookingError::LockExpired));
}

#[tokio::test]
async fn convert_of_unknown_lock_fails() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;

    let result = manager.convert(Uuid::new_v4(), Uuid::new_v4(), dt(8, 0)).await;
    assert_matches!(result, Err(BookingError::LockExpired));
}

#[tokio::test]
async fn release_is_idempotent() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();

    manager.release(lock.id).await.unwrap();
    assert_eq!(store.lock_count().await, 0);

    // Second release of the same id is a no-op, not an error
    manager.release(lock.id).await.unwrap();

    // Releasing an id that never existed is also fine
    manager.release(Uuid::new_v4()).await.unwrap();
}

#[tokio::test]
async fn released_interval_can_be_reacquired() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();
    manager.release(lock.id).await.unwrap();

    let again = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn released_lock_cannot_be_converted() {
    let clinic_id = Uuid::new_v4();
    let (_, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let lock = manager
        .acquire(clinic_id, dt(9, 0), dt(9, 30), None, now)
        .await
        .unwrap();
    manager.release(lock.id).await.unwrap();

    let result = manager.convert(lock.id, Uuid::new_v4(), now).await;
    assert_matches!(result, Err(BookingError::LockExpired));
}

#[tokio::test]
async fn sweep_removes_only_expired_unconverted_locks() {
    let clinic_id = Uuid::new_v4();
    let (store, manager) = setup(clinic_id).await;
    let now = dt(8, 0);

    let expired = SlotLock {
        id: Uuid::new_v4(),
        clinic_id,
        start_datetime: dt(9, 0),
        end_datetime: dt(9, 30),
        locked_by_user_id: None,
        expires_at: dt(7, 0),
        converted_to_appointment_id: None,
        created_at: dt(6, 55),
    };
    let converted = SlotLock {
        id: Uuid::new_v4(),
        clinic_id,
        start_datetime: dt(10, 0),
        end_datetime: dt(10, 30),
        locked_by_user_id: None,
        expires_at: dt(7, 0),
        converted_to_appointment_id: Some(Uuid::new_v4()),
        created_at: dt(6, 55),
    };
    let active = SlotLock {
        id: Uuid::new_v4(),
        clinic_id,
        start_datetime: dt(11, 0),
        end_datetime: dt(11, 30),
        locked_by_user_id: None,
        expires_at: dt(8, 5),
        converted_to_appointment_id: None,
        created_at: dt(8, 0),
    };
    store.add_lock(expired.clone()).await;
    store.add_lock(converted.clone()).await;
    store.add_lock(active.clone()).await;

    let cleaned = manager.sweep_expired(now).await.unwrap();

    assert_eq!(cleaned, 1);
    assert!(store.get_lock(expired.id).await.unwrap().is_none());
    assert!(store.get_lock(converted.id).await.unwrap().is_some());
    assert!(store.get_lock(active.id).await.unwrap().is_some());
}
