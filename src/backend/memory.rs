// src/backend/memory.rs
//
// In-process backend: dry runs and tests. Records every switch request.

use super::SceneBackend;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    scenes: Vec<String>,
    active: Mutex<Option<String>>,
    switches: Mutex<Vec<String>>,
    failing: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    /// An empty scene list accepts any scene name.
    pub fn new(scenes: Vec<String>) -> Self {
        Self {
            active: Mutex::new(scenes.first().cloned()),
            scenes,
            ..Self::default()
        }
    }

    /// Make every following call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Switch requests that succeeded, oldest first
    pub fn switches(&self) -> Vec<String> {
        lock(&self.switches).clone()
    }

    /// Change the active scene without recording a switch, as an operator
    /// clicking in the UI would.
    pub fn set_active_externally(&self, scene: &str) {
        *lock(&self.active) = Some(scene.to_string());
    }

    fn check(&self) -> BackendResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::Rejected("backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SceneBackend for MemoryBackend {
    async fn list_scenes(&self) -> BackendResult<Vec<String>> {
        self.check()?;
        Ok(self.scenes.clone())
    }

    async fn current_scene(&self) -> BackendResult<String> {
        self.check()?;
        lock(&self.active)
            .clone()
            .ok_or_else(|| BackendError::Malformed("no active scene".to_string()))
    }

    async fn switch_scene(&self, scene: &str) -> BackendResult<()> {
        self.check()?;
        if !self.scenes.is_empty() && !self.scenes.iter().any(|s| s == scene) {
            return Err(BackendError::Rejected(format!("no scene named '{}'", scene)));
        }

        info!("[dry run] switching to scene '{}'", scene);
        *lock(&self.active) = Some(scene.to_string());
        lock(&self.switches).push(scene.to_string());
        Ok(())
    }
}
