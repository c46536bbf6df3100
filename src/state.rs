use crate::engine::{CycleReport, Engine};
use crate::error::AppError;
use crate::notify::NotificationChannel;
use crate::store::memory::{MemoryStore, TelemetrySample};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

pub type SharedChannel = Arc<dyn NotificationChannel>;

#[async_trait]
impl NotificationChannel for SharedChannel {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        self.as_ref().send_email(to, subject, body).await
    }

    async fn send_push(&self, title: &str, body: &str, target_id: &str) -> Result<(), AppError> {
        self.as_ref().send_push(title, body, target_id).await
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown asset: {0}")]
    UnknownAsset(String),
    #[error(transparent)]
    App(#[from] AppError),
}

pub struct AppState {
    store: Arc<MemoryStore>,
    engine: Engine<MemoryStore, SharedChannel>,
    cycle_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, engine: Engine<MemoryStore, SharedChannel>) -> Self {
        Self {
            store,
            engine,
            cycle_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Record a sample and evaluate it. Cycles for the same asset never overlap.
    pub async fn ingest(
        &self,
        asset_id: &str,
        sample: TelemetrySample,
        now: SystemTime,
    ) -> Result<CycleReport, IngestError> {
        if !self.store.contains_asset(asset_id)? {
            return Err(IngestError::UnknownAsset(asset_id.to_string()));
        }

        let lock = self.cycle_lock(asset_id)?;
        let _guard = lock.lock().await;
        debug!(asset_id, "Cycle lock acquired");

        self.store.record_sample(asset_id, sample)?;
        Ok(self.engine.run_cycle(asset_id, now).await)
    }

    fn cycle_lock(&self, asset_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, AppError> {
        let mut locks = self.cycle_locks.lock().map_err(|_| AppError::StateLock)?;
        let lock = locks
            .entry(asset_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
        Ok(Arc::clone(lock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Limits;
    use crate::notify::NotificationDispatcher;
    use crate::notify::mock::RecordingChannel;
    use crate::store::memory::AssetProfile;
    use std::time::UNIX_EPOCH;

    fn state_with(channel: Arc<RecordingChannel>) -> AppState {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_asset(
                "a1",
                AssetProfile {
                    name: "Pallet".to_string(),
                    email: Some("ops@example.com".to_string()),
                    push_notifications: Some(true),
                    ..AssetProfile::default()
                },
            )
            .expect("insert asset");
        let shared: SharedChannel = channel;
        let engine = Engine::new(
            Arc::clone(&store),
            NotificationDispatcher::new(shared),
            Limits::default(),
        );
        AppState::new(store, engine)
    }

    fn sample(tilt: f64) -> TelemetrySample {
        TelemetrySample {
            latitude: 1.0,
            longitude: 1.0,
            temperature: 70.0,
            tilt,
            battery: Some(90.0),
        }
    }

    #[tokio::test]
    async fn ingest_unknown_asset_is_rejected() {
        let state = state_with(Arc::new(RecordingChannel::new()));

        let result = state.ingest("nope", sample(1.0), UNIX_EPOCH).await;

        assert!(matches!(result, Err(IngestError::UnknownAsset(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn ingest_delivers_through_shared_channel() -> Result<(), Box<dyn std::error::Error>> {
        let channel = Arc::new(RecordingChannel::new());
        let state = state_with(Arc::clone(&channel));

        let report = state.ingest("a1", sample(45.0), UNIX_EPOCH).await?;

        assert!(report.tilt.result.is_ok());
        assert_eq!(channel.sent()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_ingests_for_one_asset_notify_once() -> Result<(), Box<dyn std::error::Error>> {
        let channel = Arc::new(RecordingChannel::new());
        let state = Arc::new(state_with(Arc::clone(&channel)));

        let first = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.ingest("a1", sample(45.0), UNIX_EPOCH).await })
        };
        let second = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.ingest("a1", sample(50.0), UNIX_EPOCH).await })
        };
        first.await??;
        second.await??;

        assert_eq!(channel.sent()?.len(), 1);
        Ok(())
    }
}
