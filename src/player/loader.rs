use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::backends::PlaybackBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Top-level playlist
    Manifest,
    /// Variant playlist, handled like a manifest
    Level,
    /// Media segment
    Segment,
}

impl RequestClass {
    pub fn is_playlist(&self) -> bool {
        matches!(self, Self::Manifest | Self::Level)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderRequest {
    pub uri: String,
    pub class: RequestClass,
}

impl LoaderRequest {
    pub fn manifest(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            class: RequestClass::Manifest,
        }
    }

    pub fn segment(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            class: RequestClass::Segment,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedPayload {
    Text(String),
    Binary(Bytes),
}

impl LoadedPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderResponse {
    pub uri: String,
    pub payload: LoadedPayload,
}

/// Transfer statistics for one request, consumed by adaptive bitrate logic.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadStats {
    pub loaded: u64,
    pub total: u64,
    pub elapsed: Duration,
    /// Megabits per second; zero for playlist requests
    pub bandwidth_mbps: f64,
}

impl LoadStats {
    fn measure(loaded: u64, elapsed: Duration, estimate_bandwidth: bool) -> Self {
        let secs = elapsed.as_secs_f64();
        let bandwidth_mbps = if estimate_bandwidth && secs > 0.0 {
            (loaded as f64 * 8.0) / 1_000_000.0 / secs
        } else {
            0.0
        };
        Self {
            loaded,
            total: loaded,
            elapsed,
            bandwidth_mbps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderError {
    pub code: u16,
    pub text: String,
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader error {}: {}", self.code, self.text)
    }
}

/// Completion hooks registered by the streaming engine for one request.
pub trait LoaderCallbacks: Send + Sync {
    fn on_success(&self, response: LoaderResponse, stats: &LoadStats, request: &LoaderRequest);
    fn on_error(&self, error: LoaderError, request: &LoaderRequest);
}

/// Loading contract required by the streaming engine.
pub trait MediaLoader: Send + Sync + fmt::Debug {
    /// Start a request; callbacks fire at most once, and never after `abort`.
    fn load(&self, request: LoaderRequest, callbacks: Arc<dyn LoaderCallbacks>);
    fn abort(&self);
    fn is_alive(&self) -> bool;
    fn last_stats(&self) -> LoadStats;
}

/// Loader that routes playlists through the backend's ad-filtering fetch and
/// segments through its raw binary fetch.
///
/// One instance is built per engine; aborting it neutralizes every callback
/// still pending.
pub struct BackendLoader {
    backend: Arc<dyn PlaybackBackend>,
    ad_filter_enabled: bool,
    alive: Arc<AtomicBool>,
    last_stats: Arc<Mutex<LoadStats>>,
}

impl fmt::Debug for BackendLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendLoader")
            .field("ad_filter_enabled", &self.ad_filter_enabled)
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish()
    }
}

impl BackendLoader {
    pub fn new(backend: Arc<dyn PlaybackBackend>, ad_filter_enabled: bool) -> Self {
        debug!("Creating media loader (ad filter: {})", ad_filter_enabled);
        Self {
            backend,
            ad_filter_enabled,
            alive: Arc::new(AtomicBool::new(true)),
            last_stats: Arc::new(Mutex::new(LoadStats::default())),
        }
    }

    pub fn ad_filter_enabled(&self) -> bool {
        self.ad_filter_enabled
    }
}

impl MediaLoader for BackendLoader {
    fn load(&self, request: LoaderRequest, callbacks: Arc<dyn LoaderCallbacks>) {
        if !self.is_alive() {
            trace!("Ignoring load of {} on aborted loader", request.uri);
            return;
        }

        let backend = self.backend.clone();
        let alive = self.alive.clone();
        let last_stats = self.last_stats.clone();
        let ad_filter_enabled = self.ad_filter_enabled;

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = if request.class.is_playlist() {
                backend
                    .fetch_filtered_manifest(&request.uri, ad_filter_enabled)
                    .await
                    .map(LoadedPayload::Text)
            } else {
                backend
                    .fetch_binary(&request.uri)
                    .await
                    .map(LoadedPayload::Binary)
            };

            if !alive.load(Ordering::SeqCst) {
                trace!("Dropping completion for {} after abort", request.uri);
                return;
            }

            match outcome {
                Ok(payload) => {
                    let stats = LoadStats::measure(
                        payload.len() as u64,
                        started.elapsed(),
                        !request.class.is_playlist(),
                    );
                    if let Ok(mut last) = last_stats.lock() {
                        *last = stats;
                    }
                    let response = LoaderResponse {
                        uri: request.uri.clone(),
                        payload,
                    };
                    callbacks.on_success(response, &stats, &request);
                }
                Err(e) => {
                    warn!("Failed to load {:?} {}: {}", request.class, request.uri, e);
                    callbacks.on_error(
                        LoaderError {
                            code: 0,
                            text: e.to_string(),
                        },
                        &request,
                    );
                }
            }
        });
    }

    fn abort(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!("Media loader aborted");
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn last_stats(&self) -> LoadStats {
        self.last_stats
            .lock()
            .map(|stats| *stats)
            .unwrap_or_default()
    }
}
