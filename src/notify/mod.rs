//! Notification delivery.
//!
//! The dispatcher only forwards decisions that ask for a notification and only
//! when the asset has a recipient on file with notifications switched on.

use crate::error::AppError;
use crate::monitor::Decision;
use crate::store::{Field, LatestValues};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

pub mod log;
pub mod mock;

/// Fields that make up an asset's contact.
pub const CONTACT_FIELDS: [Field; 3] = [Field::Name, Field::Email, Field::PushNotifications];

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;

    async fn send_push(&self, title: &str, body: &str, target_id: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: Option<String>,
    /// Opt-in: unset means disabled.
    pub notifications_enabled: bool,
}

impl Contact {
    pub fn from_latest(asset_id: &str, values: &LatestValues) -> Self {
        Self {
            name: values
                .text(Field::Name)
                .map(str::to_string)
                .unwrap_or_else(|| asset_id.to_string()),
            email: values
                .text(Field::Email)
                .filter(|email| !email.trim().is_empty())
                .map(str::to_string),
            notifications_enabled: values.flag(Field::PushNotifications).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoRecipient,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum NotificationOutcome {
    NotRequired,
    Sent,
    Skipped(SkipReason),
    /// A notification was intended but could not be delivered.
    Failed(String),
}

pub struct NotificationDispatcher<C> {
    channel: C,
    push_target: Option<String>,
}

impl<C: NotificationChannel> NotificationDispatcher<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            push_target: None,
        }
    }

    /// Also deliver every notification as a push message to `target_id`.
    pub fn with_push(mut self, target_id: impl Into<String>) -> Self {
        self.push_target = Some(target_id.into());
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub async fn dispatch<S: Sync>(
        &self,
        decision: &Decision<S>,
        contact: &Contact,
    ) -> Result<NotificationOutcome, AppError> {
        let Some(notification) = decision.notification.as_ref() else {
            return Ok(NotificationOutcome::NotRequired);
        };

        let Some(email) = contact.email.as_deref() else {
            warn!(
                asset = %contact.name,
                "Missing e-mail, notification not sent"
            );
            return Ok(NotificationOutcome::Skipped(SkipReason::NoRecipient));
        };

        if !contact.notifications_enabled {
            warn!(asset = %contact.name, "Notifications disabled, notification not sent");
            return Ok(NotificationOutcome::Skipped(SkipReason::Disabled));
        }

        self.channel
            .send_email(email, &notification.title, &notification.message)
            .await?;
        // Push is best-effort once the e-mail is delivered.
        if let Some(target_id) = self.push_target.as_deref()
            && let Err(err) = self
                .channel
                .send_push(&notification.title, &notification.message, target_id)
                .await
        {
            warn!(asset = %contact.name, target_id, error = %err, "Push delivery failed");
        }

        info!(
            asset = %contact.name,
            title = %notification.title,
            "Notification sent"
        );
        Ok(NotificationOutcome::Sent)
    }
}
