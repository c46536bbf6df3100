use crate::monitor::{Decision, MessageContext, Notification};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFlag {
    pub left_zone: bool,
}

pub fn evaluate(
    current_temp: f64,
    min: f64,
    max: f64,
    flag: ZoneFlag,
    context: &MessageContext,
) -> Decision<ZoneFlag> {
    if flag.left_zone {
        debug!(temperature = current_temp, "Temperature alarm already raised, skipping");
        return Decision::quiet();
    }

    if current_temp <= max && current_temp >= min {
        return Decision::quiet();
    }

    info!(temperature = current_temp, min, max, "Temperature left zone");
    Decision {
        notification: Some(Notification {
            title: format!("Your asset {} left temperature zone", context.asset_name),
            message: format!(
                "Your asset left the temperature zone defined by {} and {} on {}. Temperature reached: {}°F.",
                min, max, context.time, current_temp
            ),
        }),
        state_update: Some(ZoneFlag { left_zone: true }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn context() -> MessageContext {
        MessageContext::new("Reefer 3", UNIX_EPOCH)
    }

    #[test]
    fn above_max_notifies_then_stays_quiet() {
        let first = evaluate(95.0, 40.0, 90.0, ZoneFlag::default(), &context());
        assert!(first.should_notify());
        let flag = first.state_update.expect("flag set");
        assert!(flag.left_zone);

        let second = evaluate(95.0, 40.0, 90.0, flag, &context());
        assert!(!second.should_notify());
        assert_eq!(second.state_update, None);
    }

    #[test]
    fn below_min_notifies() {
        let decision = evaluate(12.5, 40.0, 90.0, ZoneFlag::default(), &context());

        let notification = decision.notification.expect("notification");
        assert_eq!(notification.title, "Your asset Reefer 3 left temperature zone");
        assert_eq!(
            notification.message,
            "Your asset left the temperature zone defined by 40 and 90 on 1970-01-01T00:00:00Z. Temperature reached: 12.5°F."
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(!evaluate(40.0, 40.0, 90.0, ZoneFlag::default(), &context()).should_notify());
        assert!(!evaluate(90.0, 40.0, 90.0, ZoneFlag::default(), &context()).should_notify());
    }
}
