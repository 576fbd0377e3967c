//! Orchestration engine of an unattended plant-monitoring station.
//!
//! Periodic photo capture, AI health analysis, daily and weekly timelapses
//! and photo retention, driven by a wall-clock scheduler and exposed through
//! a small HTTP control surface. The binary in `main.rs` only wires these
//! modules together.

pub mod analysis;
pub mod app;
pub mod artifacts;
pub mod capture;
pub mod config;
pub mod jobs;
pub mod models;
pub mod pubsub;
pub mod retention;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod sensors;
pub mod storage;
pub mod telemetry;
pub mod timelapse;

pub use app::{AppState, Collaborators};
pub use config::Config;
