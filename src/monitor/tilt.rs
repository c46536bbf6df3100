use crate::monitor::{Decision, MessageContext, Notification};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceedanceFlag {
    pub exceeded: bool,
}

/// Lowest and highest tilt seen during the current observation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TiltExtremes {
    pub min: f64,
    pub max: f64,
}

/// Reported every cycle, independent of the exceedance flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TiltWindowReport {
    pub maximum_tilt: f64,
    pub limit: f64,
    pub reached_limit: bool,
}

pub fn evaluate(
    current_tilt: f64,
    limit: f64,
    flag: ExceedanceFlag,
    context: &MessageContext,
) -> Decision<ExceedanceFlag> {
    if flag.exceeded {
        debug!(tilt = current_tilt, "Tilt alarm already raised, skipping");
        return Decision::quiet();
    }

    if current_tilt.abs() <= limit.abs() {
        return Decision::quiet();
    }

    info!(tilt = current_tilt, limit = limit.abs(), "Tilt limit exceeded");
    Decision {
        notification: Some(Notification {
            title: format!("Your asset {} exceeded tilt limit", context.asset_name),
            message: format!(
                "Your asset exceeded tilt limit defined by {} degree on {}. Tilt reached: {} degree.",
                limit.abs(),
                context.time,
                current_tilt
            ),
        }),
        state_update: Some(ExceedanceFlag { exceeded: true }),
    }
}

pub fn window_report(extremes: Option<TiltExtremes>, limit: f64) -> TiltWindowReport {
    let maximum_tilt = extremes
        .map(|window| window.min.abs().max(window.max.abs()))
        .unwrap_or(0.0);

    TiltWindowReport {
        maximum_tilt,
        limit,
        reached_limit: maximum_tilt > limit.abs(),
    }
}
