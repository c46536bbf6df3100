//! Edge-triggered enter/exit tracking.
//!
//! The containment state is persisted between cycles by the store; this module
//! only computes the next state and whether the change deserves a notification.

use crate::geofence::{EvaluationResult, GeofenceEvent};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last observed edge, persisted as `"i"` / `"o"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    #[serde(rename = "i")]
    Entered,
    #[serde(rename = "o")]
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentState {
    pub inside_any: bool,
    pub active_event: GeofenceEvent,
    pub last_edge: Edge,
}

impl ContainmentState {
    pub fn outside() -> Self {
        Self {
            inside_any: false,
            active_event: GeofenceEvent::None,
            last_edge: Edge::Exited,
        }
    }

    pub fn inside(active_event: GeofenceEvent) -> Self {
        Self {
            inside_any: true,
            active_event,
            last_edge: Edge::Entered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Entered,
    Exited,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDecision {
    pub notify: bool,
    /// Edge crossed since the prior state; `None` on cold start or no change.
    pub kind: TransitionKind,
    pub new_state: ContainmentState,
    /// Clear tilt/temperature alarm state for the next leg of travel.
    pub reset_alarms: bool,
}

pub fn decide(
    current: &EvaluationResult,
    prior: Option<&ContainmentState>,
    notifications_enabled: bool,
) -> TransitionDecision {
    let prior_edge = prior.map(|state| state.last_edge);

    if current.any_inside {
        let event = current.dominant_event.unwrap_or_default();
        let entered = prior_edge == Some(Edge::Exited);
        let notify = entered && event == GeofenceEvent::NotifyOnEnter && notifications_enabled;

        if entered && !notify {
            debug!(
                event = ?event,
                notifications_enabled,
                "Geofence entry does not need notification"
            );
        }

        TransitionDecision {
            notify,
            kind: if entered {
                TransitionKind::Entered
            } else {
                TransitionKind::None
            },
            new_state: ContainmentState::inside(event),
            reset_alarms: prior_edge != Some(Edge::Entered),
        }
    } else {
        let exited = prior_edge == Some(Edge::Entered);
        let notify = exited
            && prior.map(|state| state.active_event) == Some(GeofenceEvent::NotifyOnExit)
            && notifications_enabled;

        if exited && !notify {
            debug!(notifications_enabled, "Geofence exit does not need notification");
        }

        TransitionDecision {
            notify,
            kind: if exited {
                TransitionKind::Exited
            } else {
                TransitionKind::None
            },
            new_state: ContainmentState::outside(),
            reset_alarms: false,
        }
    }
}
