pub mod conflict;
pub mod finalizer;
pub mod notify;
pub mod reservation;
pub mod slots;

pub use finalizer::BookingFinalizer;
pub use notify::{NoopNotifier, NotificationDispatcher, WebhookNotifier};
pub use reservation::ReservationManager;
pub use slots::SlotGeneratorService;
