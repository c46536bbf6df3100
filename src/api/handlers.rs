use crate::api::responses::{
    ApiErrorCode, ApiErrorResponse, AssetStateSuccessResponse, CycleSuccessResponse,
    GeofenceSummary, HealthStatus, HealthSuccessResponse, StepResponse, StepStatus,
};
use crate::engine::{CycleReport, GeofenceOutcome};
use crate::state::{AppState, IngestError};
use crate::store::memory::TelemetrySample;
use crate::store::{Field, TelemetryStore};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

const STATE_FIELDS: [Field; 5] = [
    Field::LastStatus,
    Field::ExceededMaxTilt,
    Field::LeftTemperatureZone,
    Field::ReachedTiltLimit,
    Field::MaximumTilt,
];

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ApiErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    build_health_response(&state, SystemTime::now())
}

pub async fn post_sample(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<String>,
    Json(sample): Json<TelemetrySample>,
) -> impl IntoResponse {
    build_sample_response(&state, &asset_id, sample, SystemTime::now()).await
}

pub async fn get_asset_state(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<String>,
) -> impl IntoResponse {
    build_asset_state_response(&state, &asset_id, SystemTime::now()).await
}

fn build_health_response(state: &AppState, now: SystemTime) -> ApiResponse<HealthSuccessResponse> {
    let assets = match state.store().asset_ids() {
        Ok(ids) => ids.len(),
        Err(err) => {
            return internal_error("/api/health", &err.to_string());
        }
    };
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(HealthSuccessResponse {
            status: HealthStatus::Ok,
            assets,
            timestamp,
        }),
        Err(_) => internal_error("/api/health", "timestamp formatting failure"),
    }
}

async fn build_sample_response(
    state: &AppState,
    asset_id: &str,
    sample: TelemetrySample,
    now: SystemTime,
) -> ApiResponse<CycleSuccessResponse> {
    let report = match state.ingest(asset_id, sample, now).await {
        Ok(report) => report,
        Err(IngestError::UnknownAsset(id)) => return unknown_asset(&id, now),
        Err(IngestError::App(err)) => {
            return internal_error("/api/assets/samples", &err.to_string());
        }
    };

    if !report.is_committed() {
        warn!(
            asset_id,
            failed_writes = report.failed_writes().len(),
            "Cycle partially committed"
        );
    }

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(map_cycle_report(&report, timestamp)),
        Err(_) => internal_error("/api/assets/samples", "timestamp formatting failure"),
    }
}

fn map_cycle_report(report: &CycleReport, timestamp: String) -> CycleSuccessResponse {
    let steps = report
        .summaries()
        .into_iter()
        .map(|step| StepResponse {
            step: step.name,
            status: if step.error.is_some() {
                StepStatus::Failed
            } else {
                StepStatus::Completed
            },
            error: step.error.map(ToString::to_string),
            notification: step.notification.clone(),
            failed_writes: step
                .writes
                .iter()
                .filter(|write| !write.is_ok())
                .map(|write| write.field.to_string())
                .collect(),
        })
        .collect();

    let geofence = match &report.geofence.result {
        Ok(GeofenceOutcome::Evaluated {
            result,
            decision,
            fence_id,
        }) => Some(GeofenceSummary {
            inside_any: result.any_inside,
            transition: decision.kind,
            fence_id: fence_id.clone(),
        }),
        Ok(GeofenceOutcome::NoGeofences) | Err(_) => None,
    };

    CycleSuccessResponse {
        asset_id: report.asset_id.clone(),
        committed: report.is_committed(),
        steps,
        geofence,
        tilt_window: report.tilt_window.result.as_ref().ok().copied(),
        timestamp,
    }
}

async fn build_asset_state_response(
    state: &AppState,
    asset_id: &str,
    now: SystemTime,
) -> ApiResponse<AssetStateSuccessResponse> {
    match state.store().contains_asset(asset_id) {
        Ok(true) => {}
        Ok(false) => return unknown_asset(asset_id, now),
        Err(err) => return internal_error("/api/assets/state", &err.to_string()),
    }
    let values = match state.store().read_latest(asset_id, &STATE_FIELDS).await {
        Ok(values) => values,
        Err(err) => return internal_error("/api/assets/state", &err.to_string()),
    };

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(AssetStateSuccessResponse {
            asset_id: asset_id.to_string(),
            containment: values.containment(Field::LastStatus).copied(),
            exceeded_max_tilt: values.flag(Field::ExceededMaxTilt).unwrap_or(false),
            left_temperature_zone: values.flag(Field::LeftTemperatureZone).unwrap_or(false),
            reached_tilt_limit: values.flag(Field::ReachedTiltLimit).unwrap_or(false),
            maximum_tilt: values.number(Field::MaximumTilt),
            timestamp,
        }),
        Err(_) => internal_error("/api/assets/state", "timestamp formatting failure"),
    }
}

fn unknown_asset<T>(asset_id: &str, now: SystemTime) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status: StatusCode::NOT_FOUND,
            body: ApiErrorResponse {
                error_code: ApiErrorCode::UnknownAsset,
                error_message: format!("Unknown asset: {asset_id}"),
                timestamp,
            },
        },
        Err(_) => internal_error("/api/assets", "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route, message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ApiErrorResponse {
            error_code: ApiErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::geo::Position;
    use crate::geofence::{Geofence, GeofenceEvent};
    use crate::monitor::Limits;
    use crate::notify::mock::RecordingChannel;
    use crate::notify::{NotificationDispatcher, NotificationOutcome};
    use crate::state::SharedChannel;
    use crate::store::memory::{AssetProfile, MemoryStore};
    use crate::transition::TransitionKind;
    use std::time::{Duration, UNIX_EPOCH};

    fn app_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        let depot = Geofence::new(
            "depot",
            vec![
                Position::new(0.0, 0.0),
                Position::new(0.0, 10.0),
                Position::new(10.0, 10.0),
                Position::new(10.0, 0.0),
            ],
            GeofenceEvent::NotifyOnEnter,
        )
        .expect("valid depot");
        store
            .insert_asset(
                "a1",
                AssetProfile {
                    name: "Pallet".to_string(),
                    email: Some("ops@example.com".to_string()),
                    push_notifications: Some(true),
                    geofences: vec![depot],
                    ..AssetProfile::default()
                },
            )
            .expect("insert asset");
        let channel: SharedChannel = Arc::new(RecordingChannel::new());
        let engine = Engine::new(
            Arc::clone(&store),
            NotificationDispatcher::new(channel),
            Limits::default(),
        );
        AppState::new(store, engine)
    }

    fn sample(latitude: f64, longitude: f64, tilt: f64) -> TelemetrySample {
        TelemetrySample {
            latitude,
            longitude,
            temperature: 70.0,
            tilt,
            battery: None,
        }
    }

    #[test]
    fn health_reports_asset_count() {
        let state = app_state();

        let response = build_health_response(&state, UNIX_EPOCH + Duration::from_secs(1));

        match response {
            ApiResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.assets, 1);
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn sample_for_unknown_asset_returns_not_found() {
        let state = app_state();

        let response = build_sample_response(&state, "a9", sample(5.0, 5.0, 0.0), UNIX_EPOCH).await;

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body.error_code, ApiErrorCode::UnknownAsset);
                assert_eq!(body.error_message, "Unknown asset: a9");
            }
            ApiResponse::Success(_) => panic!("expected unknown asset error"),
        }
    }

    #[tokio::test]
    async fn sample_runs_cycle_and_summarizes_steps() {
        let state = app_state();
        let _ = build_sample_response(&state, "a1", sample(20.0, 20.0, 0.0), UNIX_EPOCH).await;

        let response = build_sample_response(&state, "a1", sample(5.0, 5.0, 0.0), UNIX_EPOCH).await;

        match response {
            ApiResponse::Success(body) => {
                assert!(body.committed);
                let names: Vec<_> = body.steps.iter().map(|step| step.step).collect();
                assert_eq!(names, ["tilt_window", "geofence", "tilt", "temperature"]);
                let geofence = body.geofence.expect("geofence evaluated");
                assert!(geofence.inside_any);
                assert_eq!(geofence.transition, TransitionKind::Entered);
                assert_eq!(geofence.fence_id.as_deref(), Some("depot"));
                assert_eq!(body.steps[1].notification, NotificationOutcome::Sent);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn sample_reports_failed_writes_without_erroring() {
        let state = app_state();
        state
            .store()
            .fail_writes_of(Field::ExceededMaxTilt)
            .expect("inject fault");

        let response =
            build_sample_response(&state, "a1", sample(20.0, 20.0, 45.0), UNIX_EPOCH).await;

        match response {
            ApiResponse::Success(body) => {
                assert!(!body.committed);
                let tilt = &body.steps[2];
                assert_eq!(tilt.status, StepStatus::Completed);
                assert_eq!(tilt.failed_writes, ["exceededMaxTilt"]);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn asset_state_reflects_raised_flags() {
        let state = app_state();
        let _ = build_sample_response(&state, "a1", sample(20.0, 20.0, 45.0), UNIX_EPOCH).await;

        let response = build_asset_state_response(&state, "a1", UNIX_EPOCH).await;

        match response {
            ApiResponse::Success(body) => {
                assert!(body.exceeded_max_tilt);
                assert!(!body.left_temperature_zone);
                let containment = body.containment.expect("containment stored");
                assert!(!containment.inside_any);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[tokio::test]
    async fn asset_state_for_unknown_asset_returns_not_found() {
        let state = app_state();

        let response = build_asset_state_response(&state, "a9", UNIX_EPOCH).await;

        assert!(matches!(
            response,
            ApiResponse::Error {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
    }
}
