use crate::error::AppError;
use crate::notify::NotificationChannel;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Push {
        title: String,
        body: String,
        target_id: String,
    },
}

/// Records every delivery; can be built to reject all of them, or only pushes.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentMessage>>,
    fail_email: bool,
    fail_push: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_email: true,
            fail_push: true,
        }
    }

    pub fn failing_push() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_email: false,
            fail_push: true,
        }
    }

    pub fn sent(&self) -> Result<Vec<SentMessage>, AppError> {
        let guard = self.sent.lock().map_err(|_| AppError::StateLock)?;
        Ok(guard.clone())
    }

    fn record(&self, message: SentMessage) -> Result<(), AppError> {
        let rejected = match message {
            SentMessage::Email { .. } => self.fail_email,
            SentMessage::Push { .. } => self.fail_push,
        };
        if rejected {
            return Err(AppError::Notification("mock channel rejected message".to_string()));
        }
        let mut guard = self.sent.lock().map_err(|_| AppError::StateLock)?;
        guard.push(message);
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        self.record(SentMessage::Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    async fn send_push(&self, title: &str, body: &str, target_id: &str) -> Result<(), AppError> {
        self.record(SentMessage::Push {
            title: title.to_string(),
            body: body.to_string(),
            target_id: target_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_channel_records_nothing() -> Result<(), AppError> {
        let channel = RecordingChannel::failing();

        let err = channel.send_email("a@b.c", "s", "b").await.unwrap_err();

        assert_eq!(err.to_string(), "notification error: mock channel rejected message");
        assert!(channel.sent()?.is_empty());
        Ok(())
    }
}
