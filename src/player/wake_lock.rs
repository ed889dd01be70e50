use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::Property;

/// Opaque handle to a platform wake lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeLockHandle(pub u64);

/// Screen wake-lock primitive of the host platform.
#[async_trait]
pub trait WakeLockPlatform: Send + Sync + std::fmt::Debug {
    fn is_supported(&self) -> bool {
        true
    }

    async fn request(&self) -> Result<WakeLockHandle>;

    async fn release(&self, handle: WakeLockHandle) -> Result<()>;
}

/// Holds at most one platform wake lock. Acquire and release are idempotent.
#[derive(Debug)]
pub struct WakeLockManager {
    platform: Arc<dyn WakeLockPlatform>,
    held: Mutex<Option<WakeLockHandle>>,
    active: Property<bool>,
}

impl WakeLockManager {
    pub fn new(platform: Arc<dyn WakeLockPlatform>) -> Self {
        Self {
            platform,
            held: Mutex::new(None),
            active: Property::new(false, "wake_lock_active"),
        }
    }

    pub fn active(&self) -> &Property<bool> {
        &self.active
    }

    /// Returns true when a new lock was taken.
    pub async fn acquire(&self) -> bool {
        if !self.platform.is_supported() {
            return false;
        }

        let mut held = self.held.lock().await;
        if held.is_some() {
            return false;
        }

        match self.platform.request().await {
            Ok(handle) => {
                debug!("Wake lock acquired ({:?})", handle);
                *held = Some(handle);
                self.active.set(true);
                true
            }
            Err(e) => {
                warn!("Failed to acquire wake lock: {}", e);
                false
            }
        }
    }

    /// Returns true when a held lock was released.
    pub async fn release(&self) -> bool {
        let mut held = self.held.lock().await;
        let Some(handle) = held.take() else {
            return false;
        };
        self.active.set(false);

        if let Err(e) = self.platform.release(handle).await {
            warn!("Failed to release wake lock: {}", e);
        } else {
            debug!("Wake lock released ({:?})", handle);
        }
        true
    }

    /// The platform dropped the lock on its own (e.g. the page was hidden).
    pub async fn on_released(&self, handle: WakeLockHandle) {
        let mut held = self.held.lock().await;
        if *held == Some(handle) {
            debug!("Wake lock {:?} released by platform", handle);
            *held = None;
            self.active.set(false);
        }
    }

    pub async fn is_held(&self) -> bool {
        self.held.lock().await.is_some()
    }
}
