// libs/booking-cell/src/services/finalizer.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus, BookingError, CreateBookingRequest};
use crate::services::conflict;
use crate::services::notify::NotificationDispatcher;
use crate::services::reservation::ReservationManager;
use crate::stores::{AppointmentStore, OccupancyStore};

pub struct BookingFinalizer {
    occupancy: Arc<dyn OccupancyStore>,
    appointments: Arc<dyn AppointmentStore>,
    reservations: Arc<ReservationManager>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl BookingFinalizer {
    pub fn new(
        occupancy: Arc<dyn OccupancyStore>,
        appointments: Arc<dyn AppointmentStore>,
        reservations: Arc<ReservationManager>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            occupancy,
            appointments,
            reservations,
            notifier,
        }
    }

    /// Turn an active hold into a durable appointment.
    ///
    /// The appointment insert and the lock conversion must both commit or
    /// neither: a conversion failure rolls the appointment back so the
    /// interval can never be claimed twice. Notification dispatch happens
    /// only after both committed and is fire-and-forget.
    pub async fn finalize(
        &self,
        request: CreateBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        Self::validate(&request)?;

        let lock = self.reservations.get_active(request.lock_id, now).await?;

        // Defense in depth: an active hold's interval should never be
        // occupied by anything but the hold itself.
        let snapshot = self
            .occupancy
            .occupancy_for_range(lock.clinic_id, lock.start_datetime, lock.end_datetime)
            .await?;
        if conflict::is_occupied_excluding(
            &snapshot,
            lock.start_datetime,
            lock.end_datetime,
            now,
            Some(lock.id),
        ) {
            warn!(
                "Occupancy conflict under active hold {} for clinic {}",
                lock.id, lock.clinic_id
            );
            return Err(BookingError::SlotUnavailable);
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            clinic_id: lock.clinic_id,
            patient_name: request.patient_name.trim().to_string(),
            patient_phone: request.patient_phone.trim().to_string(),
            patient_email: request.patient_email,
            treatment_id: request.treatment_id,
            notes: request.notes,
            start_datetime: lock.start_datetime,
            end_datetime: lock.end_datetime,
            status: AppointmentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.appointments.insert_appointment(&appointment).await?;

        if let Err(e) = self.reservations.convert(lock.id, appointment.id, now).await {
            warn!(
                "Lock {} could not be converted, rolling back appointment {}",
                lock.id, appointment.id
            );
            if let Err(rollback_err) = self.appointments.delete_appointment(appointment.id).await {
                error!(
                    "Rollback of appointment {} failed: {}",
                    appointment.id, rollback_err
                );
            }
            return Err(e);
        }

        info!(
            "Appointment {} booked for clinic {} [{}, {})",
            appointment.id, appointment.clinic_id, appointment.start_datetime,
            appointment.end_datetime
        );

        let notifier = Arc::clone(&self.notifier);
        let created = appointment.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.appointment_created(&created).await {
                warn!(
                    "appointment.created dispatch failed for {}: {}",
                    created.id, e
                );
            }
        });

        Ok(appointment)
    }

    fn validate(request: &CreateBookingRequest) -> Result<(), BookingError> {
        if request.patient_name.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Patient name is required".to_string(),
            ));
        }
        if request.patient_phone.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Patient phone is required".to_string(),
            ));
        }
        Ok(())
    }
}
