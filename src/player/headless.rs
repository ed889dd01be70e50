//! Surface, engine and wake lock for running a session without a display,
//! as the probe binary does.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::loader::{
    LoadStats, LoadedPayload, LoaderCallbacks, LoaderError, LoaderRequest, LoaderResponse,
    MediaLoader,
};
use super::traits::{EngineErrorKind, EngineEvent, EngineFactory, RenderSurface, StreamingEngine};
use super::wake_lock::{WakeLockHandle, WakeLockPlatform};
use crate::backends::playlist;
use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy)]
struct Clock {
    current_time: f64,
    duration: f64,
    paused: bool,
    volume: f64,
    rate: f64,
}

/// A surface that never renders. Its clock only moves through `seek` and
/// [`HeadlessSurface::advance`].
#[derive(Debug)]
pub struct HeadlessSurface {
    clock: Mutex<Clock>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self {
            clock: Mutex::new(Clock {
                current_time: 0.0,
                duration: 0.0,
                paused: true,
                volume: 1.0,
                rate: 1.0,
            }),
        }
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, Clock> {
        self.clock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn advance(&self, current_time: f64, duration: f64) {
        let mut clock = self.clock();
        clock.current_time = current_time;
        clock.duration = duration;
    }
}

#[async_trait]
impl RenderSurface for HeadlessSurface {
    async fn play(&self) -> Result<()> {
        self.clock().paused = false;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.clock().paused = true;
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.clock().current_time = seconds.max(0.0);
        Ok(())
    }

    async fn current_time(&self) -> f64 {
        self.clock().current_time
    }

    async fn duration(&self) -> f64 {
        self.clock().duration
    }

    async fn is_paused(&self) -> bool {
        self.clock().paused
    }

    async fn volume(&self) -> f64 {
        self.clock().volume
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.clock().volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    async fn playback_rate(&self) -> f64 {
        self.clock().rate
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if rate <= 0.0 {
            return Err(anyhow!("invalid playback rate {}", rate));
        }
        self.clock().rate = rate;
        Ok(())
    }
}

/// Reports the fetched manifest back as engine signals.
struct ManifestProbe {
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl LoaderCallbacks for ManifestProbe {
    fn on_success(&self, response: LoaderResponse, stats: &LoadStats, _request: &LoaderRequest) {
        match response.payload {
            LoadedPayload::Text(text) => {
                info!(
                    "Manifest {} loaded: {} segments, {} bytes in {:?}",
                    response.uri,
                    playlist::segment_count(&text),
                    stats.loaded,
                    stats.elapsed
                );
                let _ = self.events.send(EngineEvent::Ready);
            }
            LoadedPayload::Binary(_) => {
                let _ = self.events.send(EngineEvent::Error {
                    kind: EngineErrorKind::Media,
                    fatal: true,
                    details: "manifest is not text".to_string(),
                });
            }
        }
    }

    fn on_error(&self, error: LoaderError, request: &LoaderRequest) {
        warn!("Manifest {} failed: {}", request.uri, error);
        let _ = self.events.send(EngineEvent::Error {
            kind: EngineErrorKind::Network,
            fatal: true,
            details: error.text,
        });
    }
}

/// Engine that only fetches the manifest through its loader.
#[derive(Debug)]
pub struct HeadlessEngine {
    loader: Arc<dyn MediaLoader>,
    uri: Mutex<Option<String>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl HeadlessEngine {
    fn request_manifest(&self) -> Result<()> {
        let uri = self
            .uri
            .lock()
            .map_err(|_| anyhow!("engine state poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("no source loaded"))?;
        self.loader.load(
            LoaderRequest::manifest(uri),
            Arc::new(ManifestProbe {
                events: self.events.clone(),
            }),
        );
        Ok(())
    }
}

#[async_trait]
impl StreamingEngine for HeadlessEngine {
    async fn load_source(&self, uri: &str) -> Result<()> {
        *self
            .uri
            .lock()
            .map_err(|_| anyhow!("engine state poisoned"))? = Some(uri.to_string());
        self.request_manifest()
    }

    async fn start_load(&self) -> Result<()> {
        self.request_manifest()
    }

    async fn recover_media_error(&self) -> Result<()> {
        self.request_manifest()
    }

    async fn destroy(&self) {
        self.loader.abort();
        debug!("Headless engine destroyed");
    }
}

/// Builds [`HeadlessEngine`]s that report through one shared channel.
#[derive(Debug)]
pub struct HeadlessEngineFactory {
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl HeadlessEngineFactory {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }
}

impl EngineFactory for HeadlessEngineFactory {
    fn create(
        &self,
        loader: Arc<dyn MediaLoader>,
        config: &EngineConfig,
    ) -> Result<Box<dyn StreamingEngine>> {
        debug!(
            "Creating headless engine (manifest retries {}, buffer {}s)",
            config.manifest_max_retries, config.max_buffer_secs
        );
        Ok(Box::new(HeadlessEngine {
            loader,
            uri: Mutex::new(None),
            events: self.events.clone(),
        }))
    }
}

/// Platform without a wake lock.
#[derive(Debug, Default)]
pub struct NoWakeLock;

#[async_trait]
impl WakeLockPlatform for NoWakeLock {
    fn is_supported(&self) -> bool {
        false
    }

    async fn request(&self) -> Result<WakeLockHandle> {
        Err(anyhow!("wake lock not supported"))
    }

    async fn release(&self, _handle: WakeLockHandle) -> Result<()> {
        Ok(())
    }
}
