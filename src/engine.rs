//! One evaluation cycle for one asset.
//!
//! A cycle reads its priors from the store, evaluates, writes the new state
//! back and dispatches notifications. Steps are independent: a failed read
//! aborts only its own step, and every write is reported individually so a
//! partially committed cycle is never mistaken for a complete one.
//!
//! Step order: tilt window report, geofence transition (which may clear the
//! alarm flags), then the tilt and temperature monitors side by side. Limits
//! are read once per cycle; a failed limits read aborts only the steps that
//! need them.

use crate::error::AppError;
use crate::geo::Position;
use crate::geofence::{self, EvaluationResult, GeofenceEvaluation};
use crate::monitor::temperature::{self, ZoneFlag};
use crate::monitor::tilt::{self, ExceedanceFlag, TiltWindowReport};
use crate::monitor::{Decision, Limits, MessageContext, Notification};
use crate::notify::{
    CONTACT_FIELDS, Contact, NotificationChannel, NotificationDispatcher, NotificationOutcome,
};
use crate::store::{Field, FieldValue, StateWrite, TelemetryStore};
use crate::transition::{self, TransitionDecision, TransitionKind};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

const GEOFENCE_FIELDS: [Field; 4] = [
    Field::Latitude,
    Field::Longitude,
    Field::LastStatus,
    Field::PushNotifications,
];
const TILT_FIELDS: [Field; 2] = [Field::ExceededMaxTilt, Field::Tilt];
const TEMPERATURE_FIELDS: [Field; 2] = [Field::LeftTemperatureZone, Field::Temperature];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub field: Field,
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct StepReport<T> {
    pub result: Result<T, AppError>,
    pub notification: NotificationOutcome,
    pub writes: Vec<WriteOutcome>,
}

impl<T> StepReport<T> {
    fn aborted(err: AppError) -> Self {
        Self {
            result: Err(err),
            notification: NotificationOutcome::NotRequired,
            writes: Vec::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.writes.iter().all(WriteOutcome::is_ok)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceOutcome {
    NoGeofences,
    Evaluated {
        result: EvaluationResult,
        decision: TransitionDecision,
        fence_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOutcome {
    pub reading: Option<f64>,
    /// The flag was already set at the start of the cycle; nothing was compared.
    pub already_raised: bool,
    /// The flag was set by this cycle.
    pub raised: bool,
}

/// Borrowed view of one step, independent of its value type.
#[derive(Debug)]
pub struct StepSummary<'a> {
    pub name: &'static str,
    pub error: Option<&'a AppError>,
    pub notification: &'a NotificationOutcome,
    pub writes: &'a [WriteOutcome],
}

#[derive(Debug)]
pub struct CycleReport {
    pub asset_id: String,
    pub tilt_window: StepReport<TiltWindowReport>,
    pub geofence: StepReport<GeofenceOutcome>,
    pub tilt: StepReport<MonitorOutcome>,
    pub temperature: StepReport<MonitorOutcome>,
}

impl CycleReport {
    pub fn summaries(&self) -> [StepSummary<'_>; 4] {
        [
            summarize("tilt_window", &self.tilt_window),
            summarize("geofence", &self.geofence),
            summarize("tilt", &self.tilt),
            summarize("temperature", &self.temperature),
        ]
    }

    /// True when every attempted state write was stored.
    pub fn is_committed(&self) -> bool {
        self.summaries()
            .iter()
            .all(|step| step.writes.iter().all(WriteOutcome::is_ok))
    }

    pub fn failed_writes(&self) -> Vec<&WriteOutcome> {
        self.summaries()
            .into_iter()
            .flat_map(|step| step.writes.iter())
            .filter(|write| !write.is_ok())
            .collect()
    }

    pub fn failed_steps(&self) -> Vec<(&'static str, &AppError)> {
        self.summaries()
            .into_iter()
            .filter_map(|step| step.error.map(|err| (step.name, err)))
            .collect()
    }
}

fn summarize<'a, T>(name: &'static str, step: &'a StepReport<T>) -> StepSummary<'a> {
    StepSummary {
        name,
        error: step.result.as_ref().err(),
        notification: &step.notification,
        writes: &step.writes,
    }
}

pub struct Engine<S, C> {
    store: Arc<S>,
    dispatcher: NotificationDispatcher<C>,
    default_limits: Limits,
}

impl<S, C> Engine<S, C>
where
    S: TelemetryStore,
    C: NotificationChannel,
{
    pub fn new(store: Arc<S>, dispatcher: NotificationDispatcher<C>, default_limits: Limits) -> Self {
        Self {
            store,
            dispatcher,
            default_limits,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher<C> {
        &self.dispatcher
    }

    /// Run one cycle. The caller guarantees no other cycle for `asset_id` is in flight.
    pub async fn run_cycle(&self, asset_id: &str, now: SystemTime) -> CycleReport {
        let contact = self
            .store
            .read_latest(asset_id, &CONTACT_FIELDS)
            .await
            .map(|values| Contact::from_latest(asset_id, &values))
            .map_err(|err| {
                warn!(asset_id, error = %err, "Failed to read asset contact");
                err.to_string()
            });
        let asset_name = contact
            .as_ref()
            .map(|contact| contact.name.clone())
            .unwrap_or_else(|_| asset_id.to_string());
        let context = MessageContext::new(asset_name, now);
        let limits = self.limits(asset_id).await;
        if let Err(err) = &limits {
            warn!(asset_id, error = %err, "Failed to read asset limits");
        }

        let tilt_window = self.report_tilt_window(asset_id, &limits).await;
        let geofence = self.evaluate_geofences(asset_id, &contact, &context).await;
        let (tilt, temperature) = tokio::join!(
            self.evaluate_tilt(asset_id, &limits, &contact, &context),
            self.evaluate_temperature(asset_id, &limits, &contact, &context),
        );

        let report = CycleReport {
            asset_id: asset_id.to_string(),
            tilt_window,
            geofence,
            tilt,
            temperature,
        };

        let failed_steps = report.failed_steps();
        for (step, err) in &failed_steps {
            warn!(asset_id, step, error = %err, "Evaluation step failed");
        }
        info!(
            asset_id,
            committed = report.is_committed(),
            failed_steps = failed_steps.len(),
            "Evaluation cycle complete"
        );
        report
    }

    async fn limits(&self, asset_id: &str) -> Result<Limits, AppError> {
        let overrides = self.store.read_limits(asset_id).await?;
        Ok(Limits::resolve(overrides, self.default_limits))
    }

    async fn report_tilt_window(
        &self,
        asset_id: &str,
        limits: &Result<Limits, AppError>,
    ) -> StepReport<TiltWindowReport> {
        let limits = match limits {
            Ok(limits) => limits,
            Err(err) => return StepReport::aborted(err.clone()),
        };
        let extremes = match self.store.read_tilt_extremes(asset_id).await {
            Ok(extremes) => extremes,
            Err(err) => return StepReport::aborted(err),
        };

        let report = tilt::window_report(extremes, limits.tilt_limit_degrees);
        let writes = vec![
            StateWrite::number(Field::MaximumTilt, report.maximum_tilt).with_unit("°"),
            StateWrite::number(Field::TiltLimit, report.limit),
            StateWrite::number(
                Field::ReachedTiltLimit,
                if report.reached_limit { 1.0 } else { 0.0 },
            ),
        ];
        let writes = self.write_all(asset_id, writes).await;

        StepReport {
            result: Ok(report),
            notification: NotificationOutcome::NotRequired,
            writes,
        }
    }

    async fn evaluate_geofences(
        &self,
        asset_id: &str,
        contact: &Result<Contact, String>,
        context: &MessageContext,
    ) -> StepReport<GeofenceOutcome> {
        let values = match self.store.read_latest(asset_id, &GEOFENCE_FIELDS).await {
            Ok(values) => values,
            Err(err) => return StepReport::aborted(err),
        };
        let position = match (
            values.require_number(Field::Latitude),
            values.require_number(Field::Longitude),
        ) {
            (Ok(latitude), Ok(longitude)) => Position::new(latitude, longitude),
            (Err(err), _) | (_, Err(err)) => return StepReport::aborted(err.into()),
        };
        let fences = match self.store.read_geofences(asset_id).await {
            Ok(fences) => fences,
            Err(err) => return StepReport::aborted(err),
        };

        let result = match geofence::evaluate(position, &fences) {
            GeofenceEvaluation::NoGeofences => {
                info!(asset_id, "There are no geofences to verify");
                return StepReport {
                    result: Ok(GeofenceOutcome::NoGeofences),
                    notification: NotificationOutcome::NotRequired,
                    writes: Vec::new(),
                };
            }
            GeofenceEvaluation::Evaluated(result) => result,
        };

        let prior = values.containment(Field::LastStatus).copied();
        if prior.is_none() {
            debug!(asset_id, "No prior containment state, initializing");
        }
        let notifications_enabled = values.flag(Field::PushNotifications).unwrap_or(false);
        let decision = transition::decide(&result, prior.as_ref(), notifications_enabled);

        let mut writes = vec![StateWrite::new(
            Field::LastStatus,
            FieldValue::Containment(decision.new_state),
        )];
        if decision.reset_alarms {
            debug!(asset_id, "Geofence entry, clearing alarm state");
            writes.extend([
                StateWrite::flag(Field::ExceededMaxTilt, false),
                StateWrite::flag(Field::LeftTemperatureZone, false),
                StateWrite::number(Field::ReachedTiltLimit, 0.0),
                StateWrite::number(Field::MaximumTilt, 0.0).with_unit("°"),
            ]);
        }
        let writes = self.write_all(asset_id, writes).await;

        let transition_decision = Decision {
            notification: if decision.notify {
                transition_notification(decision.kind, context)
            } else {
                None
            },
            state_update: Some(decision.new_state),
        };
        let notification = self.deliver(&transition_decision, contact).await;

        let fence_id = result
            .dominant_fence_index
            .map(|index| fences[index].id.clone());
        StepReport {
            result: Ok(GeofenceOutcome::Evaluated {
                result,
                decision,
                fence_id,
            }),
            notification,
            writes,
        }
    }

    async fn evaluate_tilt(
        &self,
        asset_id: &str,
        limits: &Result<Limits, AppError>,
        contact: &Result<Contact, String>,
        context: &MessageContext,
    ) -> StepReport<MonitorOutcome> {
        let values = match self.store.read_latest(asset_id, &TILT_FIELDS).await {
            Ok(values) => values,
            Err(err) => return StepReport::aborted(err),
        };
        let flag = ExceedanceFlag {
            exceeded: values.flag(Field::ExceededMaxTilt).unwrap_or(false),
        };
        if flag.exceeded {
            return already_raised(values.number(Field::Tilt));
        }

        let current = match values.require_number(Field::Tilt) {
            Ok(current) => current,
            Err(err) => return StepReport::aborted(err.into()),
        };
        let limit = match limits {
            Ok(limits) => limits.tilt_limit_degrees,
            Err(err) => return StepReport::aborted(err.clone()),
        };

        let decision = tilt::evaluate(current, limit, flag, context);
        let writes = match decision.state_update {
            Some(flag) => {
                self.write_all(
                    asset_id,
                    vec![StateWrite::flag(Field::ExceededMaxTilt, flag.exceeded)],
                )
                .await
            }
            None => Vec::new(),
        };
        let notification = self.deliver(&decision, contact).await;

        StepReport {
            result: Ok(MonitorOutcome {
                reading: Some(current),
                already_raised: false,
                raised: decision.state_update.is_some(),
            }),
            notification,
            writes,
        }
    }

    async fn evaluate_temperature(
        &self,
        asset_id: &str,
        limits: &Result<Limits, AppError>,
        contact: &Result<Contact, String>,
        context: &MessageContext,
    ) -> StepReport<MonitorOutcome> {
        let values = match self.store.read_latest(asset_id, &TEMPERATURE_FIELDS).await {
            Ok(values) => values,
            Err(err) => return StepReport::aborted(err),
        };
        let flag = ZoneFlag {
            left_zone: values.flag(Field::LeftTemperatureZone).unwrap_or(false),
        };
        if flag.left_zone {
            return already_raised(values.number(Field::Temperature));
        }

        let current = match values.require_number(Field::Temperature) {
            Ok(current) => current,
            Err(err) => return StepReport::aborted(err.into()),
        };
        let zone = match limits {
            Ok(limits) => limits.temperature_zone(),
            Err(err) => return StepReport::aborted(err.clone()),
        };
        let (min, max) = match zone {
            Ok(zone) => zone,
            Err(err) => return StepReport::aborted(err.into()),
        };

        let decision = temperature::evaluate(current, min, max, flag, context);
        let writes = match decision.state_update {
            Some(flag) => {
                self.write_all(
                    asset_id,
                    vec![StateWrite::flag(Field::LeftTemperatureZone, flag.left_zone)],
                )
                .await
            }
            None => Vec::new(),
        };
        let notification = self.deliver(&decision, contact).await;

        StepReport {
            result: Ok(MonitorOutcome {
                reading: Some(current),
                already_raised: false,
                raised: decision.state_update.is_some(),
            }),
            notification,
            writes,
        }
    }

    async fn deliver<T: Sync>(
        &self,
        decision: &Decision<T>,
        contact: &Result<Contact, String>,
    ) -> NotificationOutcome {
        if !decision.should_notify() {
            return NotificationOutcome::NotRequired;
        }
        let contact = match contact {
            Ok(contact) => contact,
            Err(err) => {
                return NotificationOutcome::Failed(format!("recipient lookup failed: {err}"));
            }
        };

        match self.dispatcher.dispatch(decision, contact).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(asset = %contact.name, error = %err, "Notification dispatch failed");
                NotificationOutcome::Failed(err.to_string())
            }
        }
    }

    async fn write_all(&self, asset_id: &str, writes: Vec<StateWrite>) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            let field = write.field;
            let error = match self.store.write_state(asset_id, write).await {
                Ok(()) => None,
                Err(err) => {
                    warn!(asset_id, field = %field, error = %err, "State write failed");
                    Some(err.to_string())
                }
            };
            outcomes.push(WriteOutcome { field, error });
        }
        outcomes
    }
}

fn already_raised(reading: Option<f64>) -> StepReport<MonitorOutcome> {
    StepReport {
        result: Ok(MonitorOutcome {
            reading,
            already_raised: true,
            raised: false,
        }),
        notification: NotificationOutcome::NotRequired,
        writes: Vec::new(),
    }
}

fn transition_notification(kind: TransitionKind, context: &MessageContext) -> Option<Notification> {
    match kind {
        TransitionKind::Entered => Some(Notification {
            title: format!("Your asset {} entered geofence", context.asset_name),
            message: format!("Your asset entered the geofence on {}", context.time),
        }),
        TransitionKind::Exited => Some(Notification {
            title: format!("Your asset {} left geofence", context.asset_name),
            message: format!("Your asset left the geofence on {}", context.time),
        }),
        TransitionKind::None => None,
    }
}
