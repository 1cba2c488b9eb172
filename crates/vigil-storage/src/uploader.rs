//! Blocking upload contract used by the capture gate.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::client::{R2Client, R2Config};
use crate::error::{StorageError, StorageResult};

/// Uploads one object per call and returns a URL for it.
///
/// Calls block; retries are the caller's concern.
pub trait Uploader: Send + Sync {
    fn upload(&self, key: &str, data: &[u8], content_type: &str) -> StorageResult<String>;

    /// Whether uploads can succeed at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Probe the backend once. Only used for startup diagnostics.
    fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// R2-backed uploader driving the async client on a runtime handle.
///
/// Must be called from a thread that is not itself running the runtime.
pub struct R2Uploader {
    client: R2Client,
    runtime: Handle,
}

impl R2Uploader {
    pub fn new(client: R2Client, runtime: Handle) -> Self {
        Self { client, runtime }
    }
}

impl Uploader for R2Uploader {
    fn upload(&self, key: &str, data: &[u8], content_type: &str) -> StorageResult<String> {
        self.runtime.block_on(async {
            self.client
                .upload_bytes(data.to_vec(), key, content_type)
                .await?;
            self.client.object_url(key).await
        })
    }

    fn check(&self) -> StorageResult<()> {
        self.runtime.block_on(self.client.check_connectivity())
    }
}

/// Uploader used when no storage is configured. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledUploader;

impl Uploader for DisabledUploader {
    fn upload(&self, _key: &str, _data: &[u8], _content_type: &str) -> StorageResult<String> {
        Err(StorageError::NotConfigured)
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn check(&self) -> StorageResult<()> {
        Err(StorageError::NotConfigured)
    }
}

/// Build the uploader from `R2_*` environment variables.
///
/// Missing configuration yields a [`DisabledUploader`]; captures are then kept locally.
pub fn uploader_from_env(runtime: Handle) -> Arc<dyn Uploader> {
    match R2Config::from_env() {
        Ok(config) => {
            info!(bucket = %config.bucket_name, "R2 uploads enabled");
            Arc::new(R2Uploader::new(R2Client::new(config), runtime))
        }
        Err(e) => {
            warn!("R2 uploads disabled: {}", e);
            Arc::new(DisabledUploader)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_uploader_always_fails() {
        let uploader = DisabledUploader;
        assert!(!uploader.is_enabled());
        let err = uploader.upload("a/b.jpg", b"jpeg", "image/jpeg").unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured));
        assert!(uploader.check().is_err());
    }
}
