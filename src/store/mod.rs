//! Telemetry store collaborator.
//!
//! The store holds the last value of every named field per asset. Evaluation
//! state (containment, alarm flags, tilt window) lives here between cycles, so
//! each cycle reads its priors, evaluates, and writes the new values back.

use crate::error::{AppError, ValidationError};
use crate::geofence::Geofence;
use crate::monitor::LimitOverrides;
use crate::monitor::tilt::TiltExtremes;
use crate::transition::ContainmentState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Latitude,
    Longitude,
    Temperature,
    Tilt,
    Battery,
    LastStatus,
    PushNotifications,
    Email,
    Name,
    ExceededMaxTilt,
    LeftTemperatureZone,
    MaximumTilt,
    ReachedTiltLimit,
    TiltLimit,
}

impl Field {
    /// Variable name as stored on the device.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latitude => "lat",
            Self::Longitude => "lng",
            Self::Temperature => "temperature",
            Self::Tilt => "tilt",
            Self::Battery => "battery",
            Self::LastStatus => "lastStatus",
            Self::PushNotifications => "pushnotifications",
            Self::Email => "email",
            Self::Name => "name",
            Self::ExceededMaxTilt => "exceededMaxTilt",
            Self::LeftTemperatureZone => "leftTemperatureZone",
            Self::MaximumTilt => "maximumTilt",
            Self::ReachedTiltLimit => "reachedTiltLimit",
            Self::TiltLimit => "tiltLimit",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Containment(ContainmentState),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Flags may also be stored as 0/1 numbers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            Self::Number(value) => Some(*value != 0.0),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_containment(&self) -> Option<&ContainmentState> {
        match self {
            Self::Containment(state) => Some(state),
            _ => None,
        }
    }
}

/// Last known value per requested field. Fields never written are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestValues {
    values: HashMap<Field, FieldValue>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, value: FieldValue) {
        self.values.insert(field, value);
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    pub fn require_number(&self, field: Field) -> Result<f64, ValidationError> {
        self.number(field)
            .filter(|value| value.is_finite())
            .ok_or(ValidationError::MissingReading(field))
    }

    pub fn flag(&self, field: Field) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn containment(&self, field: Field) -> Option<&ContainmentState> {
        self.get(field).and_then(FieldValue::as_containment)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One append-only telemetry write.
#[derive(Debug, Clone, PartialEq)]
pub struct StateWrite {
    pub field: Field,
    pub value: FieldValue,
    pub unit: Option<&'static str>,
}

impl StateWrite {
    pub fn new(field: Field, value: FieldValue) -> Self {
        Self {
            field,
            value,
            unit: None,
        }
    }

    pub fn flag(field: Field, value: bool) -> Self {
        Self::new(field, FieldValue::Flag(value))
    }

    pub fn number(field: Field, value: f64) -> Self {
        Self::new(field, FieldValue::Number(value))
    }

    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn read_latest(&self, asset_id: &str, fields: &[Field])
    -> Result<LatestValues, AppError>;

    async fn read_geofences(&self, asset_id: &str) -> Result<Vec<Geofence>, AppError>;

    async fn read_limits(&self, asset_id: &str) -> Result<LimitOverrides, AppError>;

    /// Tilt extremes since the window was last restarted, if any tilt was seen.
    async fn read_tilt_extremes(&self, asset_id: &str)
    -> Result<Option<TiltExtremes>, AppError>;

    async fn write_state(&self, asset_id: &str, write: StateWrite) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::GeofenceEvent;

    #[test]
    fn numeric_flags_are_read_as_booleans() {
        let mut values = LatestValues::new();
        values.insert(Field::ReachedTiltLimit, FieldValue::Number(1.0));
        values.insert(Field::ExceededMaxTilt, FieldValue::Flag(false));

        assert_eq!(values.flag(Field::ReachedTiltLimit), Some(true));
        assert_eq!(values.flag(Field::ExceededMaxTilt), Some(false));
        assert_eq!(values.flag(Field::LeftTemperatureZone), None);
    }

    #[test]
    fn missing_or_non_finite_required_reading_is_a_validation_error() {
        let mut values = LatestValues::new();
        values.insert(Field::Tilt, FieldValue::Number(f64::NAN));

        assert_eq!(
            values.require_number(Field::Tilt),
            Err(ValidationError::MissingReading(Field::Tilt))
        );
        assert_eq!(
            values.require_number(Field::Temperature),
            Err(ValidationError::MissingReading(Field::Temperature))
        );
    }

    #[test]
    fn field_values_serialize_untagged() -> Result<(), serde_json::Error> {
        let containment = FieldValue::Containment(ContainmentState::outside());

        assert_eq!(serde_json::to_value(FieldValue::Number(2.5))?, serde_json::json!(2.5));
        assert_eq!(serde_json::to_value(FieldValue::Flag(true))?, serde_json::json!(true));
        assert_eq!(
            serde_json::to_value(containment)?,
            serde_json::json!({
                "inside_any": false,
                "active_event": u8::from(GeofenceEvent::None),
                "last_edge": "o"
            })
        );
        Ok(())
    }

    #[test]
    fn field_display_uses_device_variable_names() {
        assert_eq!(Field::LastStatus.to_string(), "lastStatus");
        assert_eq!(
            ValidationError::MissingReading(Field::Latitude).to_string(),
            "missing required reading: lat"
        );
    }
}
