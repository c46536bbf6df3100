use crate::error::AppError;
use crate::notify::NotificationChannel;
use async_trait::async_trait;
use tracing::info;

/// Channel that writes deliveries to the log instead of a mail/push provider.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        info!(to, subject, body, "email");
        Ok(())
    }

    async fn send_push(&self, title: &str, body: &str, target_id: &str) -> Result<(), AppError> {
        info!(target_id, title, body, "push");
        Ok(())
    }
}
