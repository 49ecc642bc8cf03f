// libs/booking-cell/src/state.rs
use std::sync::Arc;
use tracing::warn;

use shared_config::AppConfig;

use crate::services::notify::{NoopNotifier, NotificationDispatcher, WebhookNotifier};
use crate::services::{BookingFinalizer, ReservationManager, SlotGeneratorService};
use crate::stores::{
    AppointmentStore, LockStore, MemoryStore, OccupancyStore, RuleStore, SupabaseStore,
};

/// Long-lived service wiring shared by all request handlers. Built once at
/// startup: the reservation manager's per-clinic critical sections only
/// serialize anything if the same instance handles every request.
#[derive(Clone)]
pub struct BookingState {
    pub slots: Arc<SlotGeneratorService>,
    pub reservations: Arc<ReservationManager>,
    pub finalizer: Arc<BookingFinalizer>,
}

impl BookingState {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        occupancy: Arc<dyn OccupancyStore>,
        locks: Arc<dyn LockStore>,
        appointments: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        hold_duration_minutes: i64,
    ) -> Self {
        let slots = Arc::new(SlotGeneratorService::new(
            Arc::clone(&rules),
            Arc::clone(&occupancy),
        ));
        let reservations = Arc::new(ReservationManager::new(
            rules,
            Arc::clone(&occupancy),
            locks,
            hold_duration_minutes,
        ));
        let finalizer = Arc::new(BookingFinalizer::new(
            occupancy,
            appointments,
            Arc::clone(&reservations),
            notifier,
        ));

        Self {
            slots,
            reservations,
            finalizer,
        }
    }

    /// Wire the Supabase backend, or fall back to the in-process store when
    /// the environment carries no Supabase credentials.
    pub fn from_config(config: &AppConfig) -> Self {
        let notifier: Arc<dyn NotificationDispatcher> =
            match config.notification_webhook_url.clone() {
                Some(url) => Arc::new(WebhookNotifier::new(url)),
                None => Arc::new(NoopNotifier),
            };

        if config.is_configured() {
            let store = Arc::new(SupabaseStore::new(config));
            Self::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                notifier,
                config.hold_duration_minutes,
            )
        } else {
            warn!("Supabase not configured, using in-memory store");
            let store = Arc::new(MemoryStore::new());
            Self::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                notifier,
                config.hold_duration_minutes,
            )
        }
    }
}
