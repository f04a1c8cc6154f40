//! A sink that writes each notification to the log.

use notifier_core::config::NotificationTarget;
use notifier_core::delivery::{DeliveryError, NotificationPayload, NotificationSink};
use notifier_types::TargetId;
use tracing::info;

/// Logs every notification as one JSON document per target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    /// Render the notification body.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Sink`] if the payload cannot be serialized.
    pub fn render(payload: &NotificationPayload) -> Result<String, DeliveryError> {
        serde_json::to_string(payload).map_err(|e| DeliveryError::Sink(e.to_string()))
    }
}

impl NotificationSink for LogSink {
    async fn send(
        &mut self,
        target: &TargetId,
        definition: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let body = Self::render(payload)?;
        info!(
            target_id = %target,
            settings = %serde_json::Value::Object(definition.settings.clone()),
            kind = payload.kind(),
            body,
            "notification"
        );
        Ok(())
    }
}
