// libs/booking-cell/src/stores/supabase.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AvailabilityBlock, AvailabilityRule, BookingError, OccupancySnapshot, SlotLock,
};
use crate::stores::{AppointmentStore, LockStore, OccupancyStore, RuleStore};

/// PostgREST-backed store. Booking is the public patient surface, so all
/// requests go out under the anon key with row-level security applied.
pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn parse_rows<T: serde::de::DeserializeOwned>(
        rows: Vec<Value>,
        what: &str,
    ) -> Result<Vec<T>, BookingError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| BookingError::PersistenceError(format!("Failed to parse {}: {}", what, e)))
    }
}

#[async_trait]
impl RuleStore for SupabaseStore {
    async fn active_rule_for_day(
        &self,
        clinic_id: Uuid,
        day_of_week: i32,
    ) -> Result<Option<AvailabilityRule>, BookingError> {
        let path = format!(
            "/rest/v1/availability_rules?clinic_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&limit=1",
            clinic_id, day_of_week
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| BookingError::PersistenceError(e.to_string()))?;

        let rules: Vec<AvailabilityRule> = Self::parse_rows(result, "availability rules")?;
        Ok(rules.into_iter().next())
    }
}

#[async_trait]
impl OccupancyStore for SupabaseStore {
    async fn occupancy_for_range(
        &self,
        clinic_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OccupancySnapshot, BookingError> {
        debug!(
            "Fetching occupancy for clinic {} from {} to {}",
            clinic_id, start, end
        );

        // Occupying appointments overlapping the range.
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&start_datetime=lt.{}&end_datetime=gt.{}&status=in.(pending,confirmed)&order=start_datetime.asc",
            clinic_id,
            end.to_rfc3339(),
            start.to_rfc3339()
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| BookingError::PersistenceError(e.to_string()))?;
        let appointments: Vec<Appointment> = Self::parse_rows(result, "appointments")?;

        // Unconverted locks overlapping the range. Expiry is deliberately not
        // filtered here; the conflict checker compares expires_at against the
        // injected clock.
        let path = format!(
            "/rest/v1/slot_locks?clinic_id=eq.{}&start_datetime=lt.{}&end_datetime=gt.{}&converted_to_appointment_id=is.null&order=start_datetime.asc",
            clinic_id,
            end.to_rfc3339(),
            start.to_rfc3339()
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| BookingError::PersistenceError(e.to_string()))?;
        let locks: Vec<SlotLock> = Self::parse_rows(result, "slot locks")?;

        // Blackout blocks overlapping the range.
        let path = format!(
            "/rest/v1/availability_blocks?clinic_id=eq.{}&start_datetime=lt.{}&end_datetime=gt.{}",
            clinic_id,
            end.to_rfc3339(),
            start.to_rfc3339()
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| BookingError::PersistenceError(e.to_string()))?;
        let blocks: Vec<AvailabilityBlock> = Self::parse_rows(result, "availability blocks")?;

        Ok(OccupancySnapshot {
            appointments,
            locks,
            blocks,
        })
    }
}

#[async_trait]
impl LockStore for SupabaseStore {
    async fn insert_lock(&self, lock: &SlotLock) -> Result<(), BookingError> {
        let lock_data = json!({
            "id": lock.id,
            "clinic_id": lock.clinic_id,
            "start_datetime": lock.start_datetime.to_rfc3339(),
            "end_datetime": lock.end_datetime.to_rfc3339(),
            "locked_by_user_id": lock.locked_by_user_id,
            "expires_at": lock.expires_at.to_rfc3339(),
            "converted_to_appointment_id": lock.converted_to_appointment_id,
            "created_at": lock.created_at.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/slot_locks",
                None,
                Some(lock_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| BookingError::PersistenceError(format!("Lock insert failed: {}", e)))?;

        if result.is_empty() {
            return Err(BookingError::PersistenceError(
                "Lock insert returned no row".to_string(),
            ));
        }

        debug!("Slot lock {} inserted", lock.id);
        Ok(())
    }

    async fn get_lock(&self, lock_id: Uuid) -> Result<Option<SlotLock>, BookingError> {
        let path = format!("/rest/v1/slot_locks?id=eq.{}", lock_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| BookingError::PersistenceError(e.to_string()))?;

        let locks: Vec<SlotLock> = Self::parse_rows(result, "slot locks")?;
        Ok(locks.into_iter().next())
    }

    async fn convert_lock(
        &self,
        lock_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<bool, BookingError> {
        // The is.null filter makes conversion first-writer-wins: a second
        // convert matches no row and reports false.
        let path = format!(
            "/rest/v1/slot_locks?id=eq.{}&converted_to_appointment_id=is.null",
            lock_id
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(json!({ "converted_to_appointment_id": appointment_id })),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| BookingError::PersistenceError(format!("Lock convert failed: {}", e)))?;

        Ok(!result.is_empty())
    }

    async fn delete_lock(&self, lock_id: Uuid) -> Result<(), BookingError> {
        let path = format!("/rest/v1/slot_locks?id=eq.{}", lock_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await
            .map_err(|e| BookingError::PersistenceError(format!("Lock release failed: {}", e)))?;

        debug!("Slot lock {} released", lock_id);
        Ok(())
    }

    async fn delete_expired_locks(&self, now: DateTime<Utc>) -> Result<u64, BookingError> {
        let path = format!(
            "/rest/v1/slot_locks?expires_at=lt.{}&converted_to_appointment_id=is.null",
            now.to_rfc3339()
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                None,
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| BookingError::PersistenceError(format!("Lock cleanup failed: {}", e)))?;

        Ok(result.len() as u64)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseStore {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), BookingError> {
        let appointment_data = json!({
            "id": appointment.id,
            "clinic_id": appointment.clinic_id,
            "patient_name": appointment.patient_name,
            "patient_phone": appointment.patient_phone,
            "patient_email": appointment.patient_email,
            "treatment_id": appointment.treatment_id,
            "notes": appointment.notes,
            "start_datetime": appointment.start_datetime.to_rfc3339(),
            "end_datetime": appointment.end_datetime.to_rfc3339(),
            "status": appointment.status.to_string(),
            "created_at": appointment.created_at.to_rfc3339(),
            "updated_at": appointment.updated_at.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(appointment_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| {
                BookingError::PersistenceError(format!("Appointment insert failed: {}", e))
            })?;

        if result.is_empty() {
            return Err(BookingError::PersistenceError(
                "Appointment insert returned no row".to_string(),
            ));
        }

        Ok(())
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await
            .map_err(|e| {
                BookingError::PersistenceError(format!("Appointment delete failed: {}", e))
            })?;

        Ok(())
    }
}
