pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod monitor;
pub mod notify;
pub mod state;
pub mod store;
pub mod transition;
