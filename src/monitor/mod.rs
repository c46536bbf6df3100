//! Sticky threshold monitors for tilt and temperature.
//!
//! Each monitor owns one persisted flag. Once the flag is set the monitor
//! stays silent until something outside it (geofence entry) clears the flag.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

pub mod temperature;
pub mod tilt;

pub const DEFAULT_TILT_LIMIT_DEGREES: f64 = 15.0;
pub const DEFAULT_MIN_TEMP_F: f64 = 40.0;
pub const DEFAULT_MAX_TEMP_F: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Outcome of one evaluator: an optional notification plus the flag to persist.
/// `state_update: None` means the stored flag is left as it is.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<S> {
    pub notification: Option<Notification>,
    pub state_update: Option<S>,
}

impl<S> Decision<S> {
    pub fn quiet() -> Self {
        Self {
            notification: None,
            state_update: None,
        }
    }

    pub fn should_notify(&self) -> bool {
        self.notification.is_some()
    }
}

/// Asset name and event time interpolated into notification texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub asset_name: String,
    pub time: String,
}

impl MessageContext {
    pub fn new(asset_name: impl Into<String>, at: SystemTime) -> Self {
        let time = OffsetDateTime::from(at).format(&Rfc3339).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to format notification timestamp");
            "unknown time".to_string()
        });
        Self {
            asset_name: asset_name.into(),
            time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub tilt_limit_degrees: f64,
    pub min_temp_f: f64,
    pub max_temp_f: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            tilt_limit_degrees: DEFAULT_TILT_LIMIT_DEGREES,
            min_temp_f: DEFAULT_MIN_TEMP_F,
            max_temp_f: DEFAULT_MAX_TEMP_F,
        }
    }
}

/// Per-asset limits as stored; any missing value falls back to a default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitOverrides {
    #[serde(default)]
    pub tilt_limit_degrees: Option<f64>,
    #[serde(default)]
    pub min_temp_f: Option<f64>,
    #[serde(default)]
    pub max_temp_f: Option<f64>,
}

impl Limits {
    /// Fill missing overrides from `defaults`. Bounds are not cross-checked here;
    /// the temperature zone is validated where it is used.
    pub fn resolve(overrides: LimitOverrides, defaults: Limits) -> Self {
        if overrides.tilt_limit_degrees.is_none() {
            debug!(
                default = defaults.tilt_limit_degrees,
                "Tilt limit not set, using default"
            );
        }
        if overrides.min_temp_f.is_none() || overrides.max_temp_f.is_none() {
            debug!(
                min = defaults.min_temp_f,
                max = defaults.max_temp_f,
                "Temperature zone incomplete, using defaults for missing bounds"
            );
        }

        Self {
            tilt_limit_degrees: overrides
                .tilt_limit_degrees
                .unwrap_or(defaults.tilt_limit_degrees),
            min_temp_f: overrides.min_temp_f.unwrap_or(defaults.min_temp_f),
            max_temp_f: overrides.max_temp_f.unwrap_or(defaults.max_temp_f),
        }
    }

    /// The `(min, max)` temperature zone, rejected when inverted.
    pub fn temperature_zone(&self) -> Result<(f64, f64), ValidationError> {
        if self.min_temp_f > self.max_temp_f {
            return Err(ValidationError::InvalidTemperatureRange {
                min: self.min_temp_f,
                max: self.max_temp_f,
            });
        }
        Ok((self.min_temp_f, self.max_temp_f))
    }
}
