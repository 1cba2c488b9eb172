//! Clients for external inference services.
//!
//! This crate provides:
//! - `MlServiceClient` for the ML sidecar (object detection, face
//!   observations, action classification, local audio classification)
//! - `HostedClassifier` for bearer-token label classification endpoints
//!
//! All clients block; call them from worker threads or `spawn_blocking`.

pub mod client;
pub mod error;
pub mod hosted;
pub mod types;

pub use client::{MlClientConfig, MlServiceClient};
pub use error::{MlClientError, MlClientResult};
pub use hosted::HostedClassifier;
pub use types::{DetectResponse, FacesResponse, LabelsResponse, WireDetection, WireFace};
