// libs/booking-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AcquireLockRequest, BookingError, BookingResponse, CreateBookingRequest, LockResponse,
    TimeSlot,
};
use crate::state::BookingState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotsQueryParams {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// Day view of a clinic's slots, unavailable ones included so the UI can
/// render them disabled.
#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<BookingState>,
    Query(params): Query<SlotsQueryParams>,
) -> Result<Json<Vec<TimeSlot>>, AppError> {
    let slots = state
        .slots
        .generate(params.clinic_id, params.date, Utc::now())
        .await
        .map_err(|e| match e {
            BookingError::ValidationError(msg) => AppError::ValidationError(msg),
            BookingError::PersistenceError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(slots))
}

/// Place a short-lived hold on a slot while the patient fills in the booking
/// form. Losing a race for the interval is a 409; the client re-fetches slots.
#[axum::debug_handler]
pub async fn acquire_lock(
    State(state): State<BookingState>,
    Json(request): Json<AcquireLockRequest>,
) -> Result<Json<LockResponse>, AppError> {
    let lock = state
        .reservations
        .acquire(
            request.clinic_id,
            request.start_datetime,
            request.end_datetime,
            request.user_id,
            Utc::now(),
        )
        .await
        .map_err(|e| match e {
            BookingError::SlotUnavailable => {
                AppError::Conflict("Slot is no longer available".to_string())
            }
            BookingError::ValidationError(msg) => AppError::ValidationError(msg),
            BookingError::PersistenceError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(LockResponse {
        lock_id: lock.id,
        expires_at: lock.expires_at,
    }))
}

/// Exchange an active hold for a durable appointment.
#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<BookingState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let appointment = state
        .finalizer
        .finalize(request, Utc::now())
        .await
        .map_err(|e| match e {
            BookingError::LockExpired => {
                AppError::Gone("Reservation hold has expired".to_string())
            }
            BookingError::SlotUnavailable => {
                AppError::Conflict("Slot is no longer available".to_string())
            }
            BookingError::ValidationError(msg) => AppError::ValidationError(msg),
            BookingError::PersistenceError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(BookingResponse {
        appointment_id: appointment.id,
        status: appointment.status,
    }))
}

/// Explicit release when a patient abandons the booking flow. Idempotent:
/// releasing an unknown or already-released hold still returns 204.
#[axum::debug_handler]
pub async fn release_lock(
    State(state): State<BookingState>,
    Path(lock_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .reservations
        .release(lock_id)
        .await
        .map_err(|e| match e {
            BookingError::PersistenceError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(StatusCode::NO_CONTENT)
}
