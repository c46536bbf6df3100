use crate::monitor::tilt::TiltWindowReport;
use crate::notify::NotificationOutcome;
use crate::transition::{ContainmentState, TransitionKind};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub assets: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StepResponse {
    pub step: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub notification: NotificationOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_writes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct GeofenceSummary {
    pub inside_any: bool,
    pub transition: TransitionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fence_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CycleSuccessResponse {
    pub asset_id: String,
    pub committed: bool,
    pub steps: Vec<StepResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geofence: Option<GeofenceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tilt_window: Option<TiltWindowReport>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AssetStateSuccessResponse {
    pub asset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containment: Option<ContainmentState>,
    pub exceeded_max_tilt: bool,
    pub left_temperature_zone: bool,
    pub reached_tilt_limit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_tilt: Option<f64>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    UnknownAsset,
    InternalError,
}
