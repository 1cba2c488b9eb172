//! Object storage for captured frames.
//!
//! This crate provides:
//! - The `Uploader` contract used by the capture gate (one attempt per call)
//! - A Cloudflare R2 implementation over the S3 API
//! - A disabled uploader for deployments without storage credentials
//! - Date-partitioned object keys

pub mod client;
pub mod error;
pub mod keys;
pub mod uploader;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::dated_key;
pub use uploader::{uploader_from_env, DisabledUploader, R2Uploader, Uploader};
