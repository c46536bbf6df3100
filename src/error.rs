use crate::store::Field;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(String),
    #[error("notification error: {0}")]
    Notification(String),
    #[error("state lock poisoned")]
    StateLock,
}

impl AppError {
    /// True when the failure came from a store or notification collaborator.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Notification(_) | Self::StateLock)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("polygon needs at least 3 vertices, got {vertices}")]
    TooFewVertices { vertices: usize },
    #[error("polygon vertex {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },
    #[error("polygon edges {first_edge} and {second_edge} intersect")]
    SelfIntersecting { first_edge: usize, second_edge: usize },
    #[error("polygon encloses zero area")]
    ZeroArea,
    #[error("missing required reading: {0}")]
    MissingReading(Field),
    #[error("temperature range is inverted: min {min} > max {max}")]
    InvalidTemperatureRange { min: f64, max: f64 },
}
