// libs/booking-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY MODELS (read-only here, owned by the staff/admin domain)
// ==============================================================================

/// Weekly recurring availability rule, one per (clinic, day-of-week).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    #[serde(default = "default_slot_duration_minutes")]
    pub slot_duration_minutes: i32,
    #[serde(default)]
    pub buffer_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_slot_duration_minutes() -> i32 {
    30
}

/// Ad-hoc blackout interval (vacation, renovation, staff training).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: Option<String>,
    pub treatment_id: Option<Uuid>,
    pub notes: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Only pending and confirmed appointments occupy their interval.
    pub fn is_occupying(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

// ==============================================================================
// SLOT LOCK MODELS
// ==============================================================================

/// Time-boxed hold on an interval while a patient completes checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotLock {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub locked_by_user_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub converted_to_appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SlotLock {
    /// A lock occupies its interval only while unconverted and unexpired.
    /// Converted locks are permanently inert; expired locks are treated as
    /// absent even if a sweep has not physically deleted them yet.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.converted_to_appointment_id.is_none() && self.expires_at > now
    }
}

/// Derived bookable window; recomputed on every read, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub display: String,
    pub available: bool,
}

/// Everything that can make an interval unavailable, fetched in one read.
#[derive(Debug, Clone, Default)]
pub struct OccupancySnapshot {
    pub appointments: Vec<Appointment>,
    pub locks: Vec<SlotLock>,
    pub blocks: Vec<AvailabilityBlock>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AcquireLockRequest {
    pub clinic_id: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockResponse {
    pub lock_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub lock_id: Uuid,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: Option<String>,
    pub treatment_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Requested slot is not available")]
    SlotUnavailable,

    #[error("Reservation hold has expired or does not exist")]
    LockExpired,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// Day-of-week index used by availability rules (0 = Sunday, 1 = Monday, etc.).
pub fn day_of_week(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}
