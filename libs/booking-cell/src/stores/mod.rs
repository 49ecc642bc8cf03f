// libs/booking-cell/src/stores/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Appointment, AvailabilityRule, BookingError, OccupancySnapshot, SlotLock};

pub mod memory;
pub mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// Read access to weekly recurring availability rules. The rules themselves
/// are owned and mutated by the staff/admin domain.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn active_rule_for_day(
        &self,
        clinic_id: Uuid,
        day_of_week: i32,
    ) -> Result<Option<AvailabilityRule>, BookingError>;
}

/// Read access to everything that can occupy an interval for a clinic.
/// Implementations may prefilter on the range and on obviously inert rows,
/// but must not filter locks on expiry: treating `expires_at <= now` as
/// absent is the conflict checker's job, so TTL semantics stay a pure time
/// comparison.
#[async_trait]
pub trait OccupancyStore: Send + Sync {
    async fn occupancy_for_range(
        &self,
        clinic_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OccupancySnapshot, BookingError>;
}

/// Write access to slot locks, owned by the reservation manager.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn insert_lock(&self, lock: &SlotLock) -> Result<(), BookingError>;

    async fn get_lock(&self, lock_id: Uuid) -> Result<Option<SlotLock>, BookingError>;

    /// Bind a lock to its appointment. Returns false when no unconverted
    /// lock with this id exists, so a lost race surfaces to the caller.
    async fn convert_lock(
        &self,
        lock_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<bool, BookingError>;

    /// Idempotent: deleting an absent lock is not an error.
    async fn delete_lock(&self, lock_id: Uuid) -> Result<(), BookingError>;

    /// Storage hygiene only; correctness never depends on this running.
    async fn delete_expired_locks(&self, now: DateTime<Utc>) -> Result<u64, BookingError>;
}

/// Write access to appointment rows, owned by the booking finalizer.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), BookingError>;

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), BookingError>;
}
