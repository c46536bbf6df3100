use crate::error::ValidationError;
use crate::geo::{GeoPolygon, Position};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Notification trigger attached to a geofence. Stored as 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GeofenceEvent {
    #[default]
    None,
    NotifyOnEnter,
    NotifyOnExit,
}

impl TryFrom<u8> for GeofenceEvent {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::NotifyOnEnter),
            2 => Ok(Self::NotifyOnExit),
            other => Err(format!("unknown geofence event: {other}")),
        }
    }
}

impl From<GeofenceEvent> for u8 {
    fn from(event: GeofenceEvent) -> Self {
        match event {
            GeofenceEvent::None => 0,
            GeofenceEvent::NotifyOnEnter => 1,
            GeofenceEvent::NotifyOnExit => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub id: String,
    pub polygon: GeoPolygon,
    pub event: GeofenceEvent,
}

impl Geofence {
    pub fn new(
        id: impl Into<String>,
        vertices: Vec<Position>,
        event: GeofenceEvent,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: id.into(),
            polygon: GeoPolygon::new(vertices)?,
            event,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Containment per geofence, in input order.
    pub per_fence_inside: Vec<bool>,
    pub any_inside: bool,
    /// First geofence (input order) containing the position.
    pub dominant_fence_index: Option<usize>,
    pub dominant_event: Option<GeofenceEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceEvaluation {
    /// The asset has no geofences configured; nothing to track.
    NoGeofences,
    Evaluated(EvaluationResult),
}

impl GeofenceEvaluation {
    pub fn any_inside(&self) -> bool {
        match self {
            Self::NoGeofences => false,
            Self::Evaluated(result) => result.any_inside,
        }
    }
}

pub fn evaluate(position: Position, geofences: &[Geofence]) -> GeofenceEvaluation {
    if geofences.is_empty() {
        debug!("No geofences configured");
        return GeofenceEvaluation::NoGeofences;
    }

    // Each test is pure; all of them finish before a transition is decided.
    let per_fence_inside: Vec<bool> = geofences
        .iter()
        .map(|fence| fence.polygon.contains(position))
        .collect();

    let dominant_fence_index = per_fence_inside.iter().position(|inside| *inside);
    let dominant_event = dominant_fence_index.map(|index| geofences[index].event);

    if let Some(index) = dominant_fence_index {
        debug!(
            fence_id = %geofences[index].id,
            event = ?geofences[index].event,
            "Position inside geofence"
        );
    }

    GeofenceEvaluation::Evaluated(EvaluationResult {
        any_inside: dominant_fence_index.is_some(),
        per_fence_inside,
        dominant_fence_index,
        dominant_event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: &str, origin: f64, event: GeofenceEvent) -> Geofence {
        Geofence::new(
            id,
            vec![
                Position::new(origin, origin),
                Position::new(origin, origin + 10.0),
                Position::new(origin + 10.0, origin + 10.0),
                Position::new(origin + 10.0, origin),
            ],
            event,
        )
        .expect("valid square")
    }

    #[test]
    fn empty_geofence_list_is_quiescent() {
        let evaluation = evaluate(Position::new(1.0, 1.0), &[]);

        assert_eq!(evaluation, GeofenceEvaluation::NoGeofences);
        assert!(!evaluation.any_inside());
    }

    #[test]
    fn first_containing_fence_dominates() {
        let fences = vec![
            square("far", 100.0, GeofenceEvent::NotifyOnExit),
            square("outer", 0.0, GeofenceEvent::NotifyOnEnter),
            square("inner", 2.0, GeofenceEvent::NotifyOnExit),
        ];

        let evaluation = evaluate(Position::new(5.0, 5.0), &fences);

        match evaluation {
            GeofenceEvaluation::Evaluated(result) => {
                assert_eq!(result.per_fence_inside, vec![false, true, true]);
                assert!(result.any_inside);
                assert_eq!(result.dominant_fence_index, Some(1));
                assert_eq!(result.dominant_event, Some(GeofenceEvent::NotifyOnEnter));
            }
            GeofenceEvaluation::NoGeofences => panic!("expected evaluated result"),
        }
    }

    #[test]
    fn outside_every_fence_has_no_dominant() {
        let fences = vec![square("a", 0.0, GeofenceEvent::NotifyOnEnter)];

        let evaluation = evaluate(Position::new(20.0, 20.0), &fences);

        match evaluation {
            GeofenceEvaluation::Evaluated(result) => {
                assert_eq!(result.per_fence_inside, vec![false]);
                assert!(!result.any_inside);
                assert_eq!(result.dominant_fence_index, None);
                assert_eq!(result.dominant_event, None);
            }
            GeofenceEvaluation::NoGeofences => panic!("expected evaluated result"),
        }
    }

    #[test]
    fn event_codes_round_trip_through_json() -> Result<(), Box<dyn std::error::Error>> {
        let event: GeofenceEvent = serde_json::from_str("2")?;
        assert_eq!(event, GeofenceEvent::NotifyOnExit);
        assert_eq!(serde_json::to_string(&GeofenceEvent::NotifyOnEnter)?, "1");
        assert!(serde_json::from_str::<GeofenceEvent>("7").is_err());
        Ok(())
    }
}
