// libs/booking-cell/src/stores/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Appointment, AvailabilityBlock, AvailabilityRule, BookingError, OccupancySnapshot, SlotLock,
};
use crate::stores::{AppointmentStore, LockStore, OccupancyStore, RuleStore};

/// In-process backing store. Serves as the fallback backend when Supabase is
/// not configured and as the fixture store for tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    rules: Vec<AvailabilityRule>,
    blocks: Vec<AvailabilityBlock>,
    appointments: HashMap<Uuid, Appointment>,
    locks: HashMap<Uuid, SlotLock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_rule(&self, rule: AvailabilityRule) {
        self.inner.write().await.rules.push(rule);
    }

    pub async fn add_block(&self, block: AvailabilityBlock) {
        self.inner.write().await.blocks.push(block);
    }

    pub async fn add_appointment(&self, appointment: Appointment) {
        self.inner
            .write()
            .await
            .appointments
            .insert(appointment.id, appointment);
    }

    pub async fn add_lock(&self, lock: SlotLock) {
        self.inner.write().await.locks.insert(lock.id, lock);
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Option<Appointment> {
        self.inner.read().await.appointments.get(&appointment_id).cloned()
    }

    pub async fn lock_count(&self) -> usize {
        self.inner.read().await.locks.len()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_rule_for_day(
        &self,
        clinic_id: Uuid,
        day_of_week: i32,
    ) -> Result<Option<AvailabilityRule>, BookingError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rules
            .iter()
            .find(|rule| {
                rule.clinic_id == clinic_id && rule.day_of_week == day_of_week && rule.is_active
            })
            .cloned())
    }
}

#[async_trait]
impl OccupancyStore for MemoryStore {
    async fn occupancy_for_range(
        &self,
        clinic_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OccupancySnapshot, BookingError> {
        let inner = self.inner.read().await;

        let mut appointments: Vec<Appointment> = inner
            .appointments
            .values()
            .filter(|apt| {
                apt.clinic_id == clinic_id && apt.start_datetime < end && apt.end_datetime > start
            })
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.start_datetime.cmp(&b.start_datetime));

        let mut locks: Vec<SlotLock> = inner
            .locks
            .values()
            .filter(|lock| {
                lock.clinic_id == clinic_id
                    && lock.start_datetime < end
                    && lock.end_datetime > start
            })
            .cloned()
            .collect();
        locks.sort_by(|a, b| a.start_datetime.cmp(&b.start_datetime));

        let blocks: Vec<AvailabilityBlock> = inner
            .blocks
            .iter()
            .filter(|block| {
                block.clinic_id == clinic_id
                    && block.start_datetime < end
                    && block.end_datetime > start
            })
            .cloned()
            .collect();

        Ok(OccupancySnapshot {
            appointments,
            locks,
            blocks,
        })
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn insert_lock(&self, lock: &SlotLock) -> Result<(), BookingError> {
        self.inner.write().await.locks.insert(lock.id, lock.clone());
        Ok(())
    }

    async fn get_lock(&self, lock_id: Uuid) -> Result<Option<SlotLock>, BookingError> {
        Ok(self.inner.read().await.locks.get(&lock_id).cloned())
    }

    async fn convert_lock(
        &self,
        lock_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<bool, BookingError> {
        let mut inner = self.inner.write().await;
        match inner.locks.get_mut(&lock_id) {
            Some(lock) if lock.converted_to_appointment_id.is_none() => {
                lock.converted_to_appointment_id = Some(appointment_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_lock(&self, lock_id: Uuid) -> Result<(), BookingError> {
        self.inner.write().await.locks.remove(&lock_id);
        Ok(())
    }

    async fn delete_expired_locks(&self, now: DateTime<Utc>) -> Result<u64, BookingError> {
        let mut inner = self.inner.write().await;
        let before = inner.locks.len();
        inner
            .locks
            .retain(|_, lock| lock.converted_to_appointment_id.is_some() || lock.expires_at > now);
        let removed = (before - inner.locks.len()) as u64;
        debug!("Removed {} expired slot locks from memory store", removed);
        Ok(removed)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), BookingError> {
        self.inner
            .write()
            .await
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), BookingError> {
        self.inner.write().await.appointments.remove(&appointment_id);
        Ok(())
    }
}
