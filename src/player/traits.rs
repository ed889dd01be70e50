use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use super::loader::MediaLoader;
use crate::config::EngineConfig;

/// Class of a fatal or non-fatal engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Manifest or segment transport failure
    Network,
    /// Decode or buffer append failure
    Media,
    Other,
}

/// Signals raised by the rendering surface and the streaming engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Enough media is buffered to start; the resume target is applied here
    Ready,
    Play,
    Pause,
    Ended,
    TimeUpdate {
        current_seconds: f64,
        duration_seconds: f64,
    },
    VolumeChanged(f64),
    RateChanged(f64),
    Error {
        kind: EngineErrorKind,
        fatal: bool,
        details: String,
    },
}

/// The persistent playback surface: one per view, survives engine rebuilds.
#[async_trait]
pub trait RenderSurface: Send + Sync + Debug {
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn seek(&self, seconds: f64) -> Result<()>;
    async fn current_time(&self) -> f64;
    /// Zero while unknown
    async fn duration(&self) -> f64;
    async fn is_paused(&self) -> bool;
    async fn volume(&self) -> f64;
    async fn set_volume(&self, volume: f64) -> Result<()>;
    async fn playback_rate(&self) -> f64;
    async fn set_playback_rate(&self, rate: f64) -> Result<()>;
}

/// One streaming-engine instance bound to one manifest URI.
#[async_trait]
pub trait StreamingEngine: Send + Sync + Debug {
    /// Attach to the surface and start loading the manifest at `uri`.
    async fn load_source(&self, uri: &str) -> Result<()>;
    /// Restart loading after a fatal network error.
    async fn start_load(&self) -> Result<()>;
    /// Attempt in-place recovery after a media error.
    async fn recover_media_error(&self) -> Result<()>;
    /// Release the instance; its loader is aborted.
    async fn destroy(&self);
}

/// Builds streaming engines that fetch through the given loader.
pub trait EngineFactory: Send + Sync + Debug {
    fn create(
        &self,
        loader: Arc<dyn MediaLoader>,
        config: &EngineConfig,
    ) -> Result<Box<dyn StreamingEngine>>;
}
