//! Axum HTTP API over the perception core.
//!
//! This crate provides:
//! - Live MJPEG view and latest detections
//! - Face registration, recognition and identity listing
//! - Manual capture and on-demand emotion classification
//! - Last-result slots of every worker, the event timeline and attendance
//! - Prometheus metrics
//!
//! Core calls block, so handlers run them on the blocking pool.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, Collaborators, Workers};
