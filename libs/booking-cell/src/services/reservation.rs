// libs/booking-cell/src/services/reservation.rs
//
// Slot-lock lifecycle: Active -> Converted | Released. Acquisition is the
// sole mutual-exclusion point; PostgREST has no exclusion constraint over
// intervals, so the check-and-insert runs inside a per-clinic critical
// section. Expiry is implicit: an expired lock is absent by time comparison,
// and the periodic sweep only reclaims storage.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{day_of_week, BookingError, SlotLock};
use crate::services::conflict;
use crate::stores::{LockStore, OccupancyStore, RuleStore};

/// Upper bound on waiting for a clinic's critical section. A caller that
/// cannot enter in time gets a retryable SlotUnavailable instead of hanging.
const CLINIC_MUTEX_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

pub struct ReservationManager {
    rules: Arc<dyn RuleStore>,
    occupancy: Arc<dyn OccupancyStore>,
    locks: Arc<dyn LockStore>,
    hold_duration_minutes: i64,
    clinic_mutexes: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ReservationManager {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        occupancy: Arc<dyn OccupancyStore>,
        locks: Arc<dyn LockStore>,
        hold_duration_minutes: i64,
    ) -> Self {
        Self {
            rules,
            occupancy,
            locks,
            hold_duration_minutes,
            clinic_mutexes: Mutex::new(HashMap::new()),
        }
    }

    async fn clinic_mutex(&self, clinic_id: Uuid) -> Arc<Mutex<()>> {
        let mut mutexes = self.clinic_mutexes.lock().await;
        mutexes
            .entry(clinic_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a time-boxed hold on [start, end) for a clinic.
    ///
    /// Re-validates occupancy immediately before insertion: the availability
    /// the patient saw may be stale by the time they pick a slot. Of two
    /// concurrent acquisitions for overlapping intervals, whichever enters
    /// the clinic's critical section first wins; the loser gets
    /// `SlotUnavailable` and must re-fetch slots.
    pub async fn acquire(
        &self,
        clinic_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<SlotLock, BookingError> {
        if start >= end {
            return Err(BookingError::ValidationError(
                "Start must be before end".to_string(),
            ));
        }
        if start < now {
            return Err(BookingError::ValidationError(
                "Cannot reserve a slot in the past".to_string(),
            ));
        }
        self.validate_grid_alignment(clinic_id, start, end).await?;

        let mutex = self.clinic_mutex(clinic_id).await;
        let _guard = tokio::time::timeout(CLINIC_MUTEX_TIMEOUT, mutex.lock())
            .await
            .map_err(|_| {
                warn!("Timed out waiting for clinic {} critical section", clinic_id);
                BookingError::SlotUnavailable
            })?;

        let snapshot = self
            .occupancy
            .occupancy_for_range(clinic_id, start, end)
            .await?;
        if conflict::is_occupied(&snapshot, start, end, now) {
            debug!(
                "Acquire rejected for clinic {}: [{}, {}) is occupied",
                clinic_id, start, end
            );
            return Err(BookingError::SlotUnavailable);
        }

        let lock = SlotLock {
            id: Uuid::new_v4(),
            clinic_id,
            start_datetime: start,
            end_datetime: end,
            locked_by_user_id: user_id,
            expires_at: now + Duration::minutes(self.hold_duration_minutes),
            converted_to_appointment_id: None,
            created_at: now,
        };
        self.locks.insert_lock(&lock).await?;

        info!(
            "Slot lock {} acquired for clinic {} [{}, {}), expires {}",
            lock.id, clinic_id, start, end, lock.expires_at
        );
        Ok(lock)
    }

    /// Fetch a lock and confirm it is still Active; missing, expired, or
    /// already-converted holds all surface as `LockExpired`.
    pub async fn get_active(
        &self,
        lock_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SlotLock, BookingError> {
        let lock = self
            .locks
            .get_lock(lock_id)
            .await?
            .ok_or(BookingError::LockExpired)?;

        if !lock.is_active(now) {
            debug!("Lock {} is no longer active", lock_id);
            return Err(BookingError::LockExpired);
        }

        Ok(lock)
    }

    /// Bind an Active lock to its finalized appointment. This is the only
    /// legal way an appointment becomes bound to a prior reservation; once
    /// converted the lock is permanently inert.
    pub async fn convert(
        &self,
        lock_id: Uuid,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let lock = self.get_active(lock_id, now).await?;

        if !self.locks.convert_lock(lock.id, appointment_id).await? {
            warn!("Lock {} vanished between liveness check and convert", lock_id);
            return Err(BookingError::LockExpired);
        }

        info!(
            "Slot lock {} converted to appointment {}",
            lock_id, appointment_id
        );
        Ok(())
    }

    /// Idempotent release: a second call for the same id is a no-op.
    pub async fn release(&self, lock_id: Uuid) -> Result<(), BookingError> {
        self.locks.delete_lock(lock_id).await?;
        debug!("Slot lock {} released", lock_id);
        Ok(())
    }

    /// Delete expired unconverted lock rows. Hygiene only: an expired row is
    /// already invisible to the conflict checker.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, BookingError> {
        let cleaned = self.locks.delete_expired_locks(now).await?;
        if cleaned > 0 {
            info!("Cleaned up {} expired slot locks", cleaned);
        }
        Ok(cleaned)
    }

    /// The requested interval must sit exactly on the clinic's slot grid for
    /// that day: full slot duration, inside working hours, a whole number of
    /// steps from the window start.
    async fn validate_grid_alignment(
        &self,
        clinic_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let date = start.date_naive();
        let rule = self
            .rules
            .active_rule_for_day(clinic_id, day_of_week(date))
            .await?
            .filter(|rule| rule.is_active)
            .ok_or_else(|| {
                BookingError::ValidationError(
                    "Clinic has no availability on this day".to_string(),
                )
            })?;

        if (end - start).num_minutes() != rule.slot_duration_minutes as i64 {
            return Err(BookingError::ValidationError(
                "Interval does not match the clinic's slot duration".to_string(),
            ));
        }

        let window_start = date.and_time(rule.start_time).and_utc();
        let window_end = date.and_time(rule.end_time).and_utc();
        if start < window_start || end > window_end {
            return Err(BookingError::ValidationError(
                "Interval is outside clinic hours".to_string(),
            ));
        }

        let step = (rule.slot_duration_minutes + rule.buffer_minutes) as i64;
        if step <= 0 || (start - window_start).num_minutes() % step != 0 {
            return Err(BookingError::ValidationError(
                "Interval is not aligned to the clinic's slot grid".to_string(),
            ));
        }

        Ok(())
    }
}
