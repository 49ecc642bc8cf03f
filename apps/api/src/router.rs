use axum::{
    Router,
    routing::get,
};

use booking_cell::router::booking_routes;
use booking_cell::BookingState;

pub fn create_router(state: BookingState) -> Router {
    Router::new()
        .route("/", get(|| async { "Dental clinic booking API is running!" }))
        .merge(booking_routes(state))
}
