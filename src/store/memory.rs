//! In-process telemetry store, seeded from a JSON asset file.

use crate::error::{AppError, ValidationError};
use crate::geo::Position;
use crate::geofence::{Geofence, GeofenceEvent};
use crate::monitor::LimitOverrides;
use crate::monitor::tilt::TiltExtremes;
use crate::store::{Field, FieldValue, LatestValues, StateWrite, TelemetryStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info};

/// Number of recent state writes kept per asset.
pub const WRITE_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct AssetProfile {
    pub name: String,
    pub email: Option<String>,
    pub push_notifications: Option<bool>,
    pub limits: LimitOverrides,
    pub geofences: Vec<Geofence>,
}

/// A live reading as delivered by the device.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TelemetrySample {
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: f64,
    pub tilt: f64,
    #[serde(default)]
    pub battery: Option<f64>,
}

#[derive(Debug, Default)]
struct AssetRecord {
    geofences: Vec<Geofence>,
    limits: LimitOverrides,
    latest: HashMap<Field, FieldValue>,
    writes: VecDeque<StateWrite>,
    tilt_window: Option<TiltExtremes>,
}

#[derive(Debug, Default)]
struct Faults {
    reads: HashSet<Field>,
    writes: HashSet<Field>,
    geofences: bool,
    limits: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    assets: RwLock<HashMap<String, AssetRecord>>,
    faults: RwLock<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path)?;
        let seed: SeedFile = serde_json::from_str(&contents)?;
        let store = Self::from_seed(seed)?;
        Ok(store)
    }

    pub fn from_seed(seed: SeedFile) -> Result<Self, SeedError> {
        let store = Self::new();
        for asset in seed.assets {
            let (id, profile) = asset.into_profile()?;
            store.insert_asset(&id, profile)?;
        }
        Ok(store)
    }

    pub fn insert_asset(&self, asset_id: &str, profile: AssetProfile) -> Result<(), AppError> {
        let mut latest = HashMap::new();
        latest.insert(Field::Name, FieldValue::Text(profile.name));
        if let Some(email) = profile.email {
            latest.insert(Field::Email, FieldValue::Text(email));
        }
        if let Some(enabled) = profile.push_notifications {
            latest.insert(Field::PushNotifications, FieldValue::Flag(enabled));
        }

        let record = AssetRecord {
            geofences: profile.geofences,
            limits: profile.limits,
            latest,
            ..AssetRecord::default()
        };

        let mut guard = self.assets.write().map_err(|_| AppError::StateLock)?;
        guard.insert(asset_id.to_string(), record);
        info!(asset_id, "Asset registered");
        Ok(())
    }

    pub fn contains_asset(&self, asset_id: &str) -> Result<bool, AppError> {
        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        Ok(guard.contains_key(asset_id))
    }

    pub fn asset_ids(&self) -> Result<Vec<String>, AppError> {
        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        let mut ids: Vec<String> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Store a live reading and extend the tilt window.
    pub fn record_sample(&self, asset_id: &str, sample: TelemetrySample) -> Result<(), AppError> {
        let mut guard = self.assets.write().map_err(|_| AppError::StateLock)?;
        let record = guard
            .get_mut(asset_id)
            .ok_or_else(|| unknown_asset(asset_id))?;

        record
            .latest
            .insert(Field::Latitude, FieldValue::Number(sample.latitude));
        record
            .latest
            .insert(Field::Longitude, FieldValue::Number(sample.longitude));
        record
            .latest
            .insert(Field::Temperature, FieldValue::Number(sample.temperature));
        record
            .latest
            .insert(Field::Tilt, FieldValue::Number(sample.tilt));
        if let Some(battery) = sample.battery {
            record
                .latest
                .insert(Field::Battery, FieldValue::Number(battery));
        }
        if sample.tilt.is_finite() {
            record.tilt_window = Some(match record.tilt_window {
                None => TiltExtremes {
                    min: sample.tilt,
                    max: sample.tilt,
                },
                Some(window) => TiltExtremes {
                    min: window.min.min(sample.tilt),
                    max: window.max.max(sample.tilt),
                },
            });
        }
        debug!(asset_id, "Sample recorded");
        Ok(())
    }

    /// The most recent state writes applied to the asset, oldest first.
    /// At most [`WRITE_LOG_CAPACITY`] are kept.
    pub fn writes(&self, asset_id: &str) -> Result<Vec<StateWrite>, AppError> {
        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        let record = guard.get(asset_id).ok_or_else(|| unknown_asset(asset_id))?;
        Ok(record.writes.iter().cloned().collect())
    }

    pub fn fail_reads_of(&self, field: Field) -> Result<(), AppError> {
        let mut faults = self.faults.write().map_err(|_| AppError::StateLock)?;
        faults.reads.insert(field);
        Ok(())
    }

    pub fn fail_writes_of(&self, field: Field) -> Result<(), AppError> {
        let mut faults = self.faults.write().map_err(|_| AppError::StateLock)?;
        faults.writes.insert(field);
        Ok(())
    }

    pub fn fail_geofence_reads(&self) -> Result<(), AppError> {
        let mut faults = self.faults.write().map_err(|_| AppError::StateLock)?;
        faults.geofences = true;
        Ok(())
    }

    pub fn fail_limit_reads(&self) -> Result<(), AppError> {
        let mut faults = self.faults.write().map_err(|_| AppError::StateLock)?;
        faults.limits = true;
        Ok(())
    }

    pub fn clear_faults(&self) -> Result<(), AppError> {
        let mut faults = self.faults.write().map_err(|_| AppError::StateLock)?;
        *faults = Faults::default();
        Ok(())
    }

    fn check_fault(&self, failing: impl FnOnce(&Faults) -> bool, what: &str) -> Result<(), AppError> {
        let faults = self.faults.read().map_err(|_| AppError::StateLock)?;
        if failing(&faults) {
            return Err(AppError::Store(format!("injected failure on {what}")));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn read_latest(
        &self,
        asset_id: &str,
        fields: &[Field],
    ) -> Result<LatestValues, AppError> {
        self.check_fault(
            |faults| fields.iter().any(|field| faults.reads.contains(field)),
            "read",
        )?;

        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        let record = guard.get(asset_id).ok_or_else(|| unknown_asset(asset_id))?;

        let mut values = LatestValues::new();
        for field in fields {
            if let Some(value) = record.latest.get(field) {
                values.insert(*field, value.clone());
            }
        }
        Ok(values)
    }

    async fn read_geofences(&self, asset_id: &str) -> Result<Vec<Geofence>, AppError> {
        self.check_fault(|faults| faults.geofences, "geofence read")?;
        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        let record = guard.get(asset_id).ok_or_else(|| unknown_asset(asset_id))?;
        Ok(record.geofences.clone())
    }

    async fn read_limits(&self, asset_id: &str) -> Result<LimitOverrides, AppError> {
        self.check_fault(|faults| faults.limits, "limit read")?;
        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        let record = guard.get(asset_id).ok_or_else(|| unknown_asset(asset_id))?;
        Ok(record.limits)
    }

    async fn read_tilt_extremes(&self, asset_id: &str) -> Result<Option<TiltExtremes>, AppError> {
        self.check_fault(|faults| faults.reads.contains(&Field::Tilt), "tilt history read")?;
        let guard = self.assets.read().map_err(|_| AppError::StateLock)?;
        let record = guard.get(asset_id).ok_or_else(|| unknown_asset(asset_id))?;
        Ok(record.tilt_window)
    }

    async fn write_state(&self, asset_id: &str, write: StateWrite) -> Result<(), AppError> {
        self.check_fault(|faults| faults.writes.contains(&write.field), "write")?;
        let mut guard = self.assets.write().map_err(|_| AppError::StateLock)?;
        let record = guard
            .get_mut(asset_id)
            .ok_or_else(|| unknown_asset(asset_id))?;

        // Zeroing the recorded maximum starts a new observation window.
        if write.field == Field::MaximumTilt && write.value.as_f64() == Some(0.0) {
            record.tilt_window = None;
        }
        record.latest.insert(write.field, write.value.clone());
        if record.writes.len() == WRITE_LOG_CAPACITY {
            record.writes.pop_front();
        }
        record.writes.push_back(write);
        Ok(())
    }
}

fn unknown_asset(asset_id: &str) -> AppError {
    AppError::Store(format!("unknown asset: {asset_id}"))
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub assets: Vec<AssetSeed>,
}

#[derive(Debug, Deserialize)]
pub struct AssetSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub push_notifications: Option<bool>,
    #[serde(default)]
    pub limits: LimitOverrides,
    #[serde(default)]
    pub geofences: Vec<GeofenceSeed>,
}

/// Geofence ring in GeoJSON order: each pair is `[lng, lat]`.
#[derive(Debug, Deserialize)]
pub struct GeofenceSeed {
    pub id: String,
    #[serde(default)]
    pub event: GeofenceEvent,
    pub coordinates: Vec<[f64; 2]>,
}

impl AssetSeed {
    fn into_profile(self) -> Result<(String, AssetProfile), ValidationError> {
        let geofences = self
            .geofences
            .into_iter()
            .map(|fence| {
                let ring = fence
                    .coordinates
                    .into_iter()
                    .map(Position::from_lng_lat)
                    .collect();
                Geofence::new(fence.id, ring, fence.event)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            self.id,
            AssetProfile {
                name: self.name,
                email: self.email,
                push_notifications: self.push_notifications,
                limits: self.limits,
                geofences,
            },
        ))
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read asset seed: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse asset seed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid asset seed: {0}")]
    Invalid(#[from] ValidationError),
    #[error("failed to register seeded asset: {0}")]
    Store(#[from] AppError),
}
