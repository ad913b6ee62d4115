//! Notification channel adapters (spec §4.6: "broadcasts it across
//! configured channels (email/Slack/PagerDuty adapters)").
//!
//! Grounded on `arbiter::escalation::webhook::WebhookNotifier`'s
//! per-type payload formatting and its "demo mode" log fallback when no
//! live credentials are configured -- generalized from a single webhook
//! list to the three named channels spec §6 configures minimum severity
//! for, and moved behind a trait so a real HTTP/SMTP/PagerDuty client can
//! replace the logging default without touching the bus.

use async_trait::async_trait;
use sentinel_core::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::notification::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Slack,
    Pager,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver `notification`. Errors are retried by the bus's bounded
    /// retry queue (spec §4.6); this call itself makes one attempt.
    async fn deliver(&self, notification: &Notification) -> Result<(), String>;
}

/// Demo-mode default: logs at a severity matching the notification's risk
/// level rather than performing any network call, matching the teacher's
/// `WebhookNotifier::send_webhook` fallback when
/// `AGENTKERN_WEBHOOK_ENABLED` is unset.
pub struct LoggingChannel {
    kind: ChannelKind,
}

impl LoggingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for LoggingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), String> {
        match notification.risk_level {
            RiskLevel::Critical | RiskLevel::Emergency => {
                tracing::error!(
                    channel = ?self.kind,
                    notification_id = %notification.notification_id,
                    title = %notification.title,
                    "notification delivered (demo channel)"
                );
            }
            RiskLevel::High => {
                tracing::warn!(
                    channel = ?self.kind,
                    notification_id = %notification.notification_id,
                    title = %notification.title,
                    "notification delivered (demo channel)"
                );
            }
            _ => {
                tracing::info!(
                    channel = ?self.kind,
                    notification_id = %notification.notification_id,
                    title = %notification.title,
                    "notification delivered (demo channel)"
                );
            }
        }
        Ok(())
    }
}
