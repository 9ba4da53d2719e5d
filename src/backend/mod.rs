// src/backend/mod.rs

pub mod memory;
pub mod obs_http;

pub use memory::MemoryBackend;
pub use obs_http::ObsHttpBackend;

use crate::error::{BackendResult, ConfigError};
use crate::types::{BackendKind, Config};
use async_trait::async_trait;
use std::sync::Arc;

/// Presentation backend that owns the active scene.
#[async_trait]
pub trait SceneBackend: Send + Sync {
    /// Scene names in presentation UI order
    async fn list_scenes(&self) -> BackendResult<Vec<String>>;

    async fn current_scene(&self) -> BackendResult<String>;

    async fn switch_scene(&self, scene: &str) -> BackendResult<()>;
}

/// Build the configured backend.
pub fn connect(config: &Config) -> Result<Arc<dyn SceneBackend>, ConfigError> {
    match config.backend.kind {
        BackendKind::ObsHttp => {
            let url = config
                .backend_url()
                .ok_or_else(|| ConfigError::MissingBackendUrl("obs_http".to_string()))?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::UnsupportedBackendUrl(url.to_string()));
            }
            let backend = ObsHttpBackend::new(
                url,
                config.backend_password(),
                std::time::Duration::from_millis(config.backend.timeout_ms),
            )
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(config.backend.scenes.clone()))),
    }
}
