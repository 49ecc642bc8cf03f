pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod stores;

// Re-export the core types for external use
pub use models::*;
pub use state::BookingState;
