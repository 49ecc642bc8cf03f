// libs/booking-cell/src/router.rs
use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::BookingState;

pub fn booking_routes(state: BookingState) -> Router {
    Router::new()
        .route("/slots", get(handlers::get_slots))
        .route("/locks", post(handlers::acquire_lock))
        .route("/locks/{lock_id}", delete(handlers::release_lock))
        .route("/bookings", post(handlers::create_booking))
        .with_state(state)
}
