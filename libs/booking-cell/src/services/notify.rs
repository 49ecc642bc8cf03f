// libs/booking-cell/src/services/notify.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::models::Appointment;

/// One-way event sink for booking outcomes. Dispatch failures are logged by
/// the caller and never unwind a committed booking.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn appointment_created(&self, appointment: &Appointment) -> Result<()>;
}

/// Posts the `appointment.created` event to the configured webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn appointment_created(&self, appointment: &Appointment) -> Result<()> {
        let event = json!({
            "event": "appointment.created",
            "appointment": appointment,
        });

        let response = self.client.post(&self.url).json(&event).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Webhook returned {}: {}", status, error_text));
        }

        debug!("Dispatched appointment.created for {}", appointment.id);
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl NotificationDispatcher for NoopNotifier {
    async fn appointment_created(&self, appointment: &Appointment) -> Result<()> {
        debug!(
            "Notification dispatch disabled, skipping appointment.created for {}",
            appointment.id
        );
        Ok(())
    }
}
