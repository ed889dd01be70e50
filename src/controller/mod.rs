//! Playback session controller.
//!
//! Owns the session store and phase machine, and drives every asynchronous
//! activity that races against them: resolution, source and episode
//! switches, progress saves, skip and preload checks, and the wake lock.
//! Results of backend calls are committed only if the stale-response guard
//! confirms they still describe the current session.

mod address;
mod effects;
mod transitions;


pub use address::{AddressSink, LatestAddress, to_query_string};

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backends::PlaybackBackend;
use crate::config::Config;
use crate::events::{EventBus, NotificationLevel};
use crate::models::RouteParams;
use crate::player::{
    BackendLoader, EngineFactory, RenderSurface, StreamingEngine, WakeLockManager,
    WakeLockPlatform,
};
use crate::scheduling::{PreloadTracker, ProgressScheduler, SaveCounts, Throttle};
use crate::session::{PhaseMachine, Session, SessionPhase, SessionStore, StaleGuard};
use crate::utils::{SessionError, SessionResult};

/// External collaborators of a controller.
#[derive(Debug, Clone)]
pub struct ControllerParts {
    pub backend: Arc<dyn PlaybackBackend>,
    pub surface: Arc<dyn RenderSurface>,
    pub engines: Arc<dyn EngineFactory>,
    pub wake_lock: Arc<dyn WakeLockPlatform>,
    pub address: Arc<dyn AddressSink>,
    pub events: Arc<EventBus>,
}

/// The engine instance currently bound to the surface, with its loader.
#[derive(Debug)]
struct ActiveEngine {
    uri: String,
    ad_filter_enabled: bool,
    engine: Box<dyn StreamingEngine>,
    loader: Arc<BackendLoader>,
}

#[derive(Debug)]
struct Scheduling {
    check_throttle: Throttle,
    progress: ProgressScheduler,
    preload: PreloadTracker,
    pending_advance: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
struct MediaState {
    last_volume: f64,
    last_rate: f64,
    network_recoveries: u32,
    media_recoveries: u32,
    rebuilt: bool,
}

#[derive(Debug)]
pub struct SessionController {
    config: Config,
    backend: Arc<dyn PlaybackBackend>,
    surface: Arc<dyn RenderSurface>,
    engines: Arc<dyn EngineFactory>,
    address: Arc<dyn AddressSink>,
    events: Arc<EventBus>,

    store: SessionStore,
    phase: PhaseMachine,
    wake_lock: WakeLockManager,

    resolution_guard: StaleGuard,
    switch_guard: StaleGuard,
    favorite_guard: StaleGuard,
    check_guard: StaleGuard,
    advance_guard: StaleGuard,

    engine: tokio::sync::Mutex<Option<ActiveEngine>>,
    scheduling: Mutex<Scheduling>,
    media: Mutex<MediaState>,
    mount_params: Mutex<RouteParams>,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(config: Config, parts: ControllerParts) -> Arc<Self> {
        let initial = Session {
            ad_filter_enabled: config.player.ad_filter_default,
            preload_enabled: true,
            ..Session::default()
        };

        let scheduling = Scheduling {
            check_throttle: Throttle::new(config.player.skip_check_interval()),
            progress: ProgressScheduler::new(config.storage.progress_interval()),
            preload: PreloadTracker::new(),
            pending_advance: None,
        };
        let media = MediaState {
            last_volume: config.player.default_volume,
            last_rate: config.player.default_rate,
            network_recoveries: 0,
            media_recoveries: 0,
            rebuilt: false,
        };

        Arc::new(Self {
            backend: parts.backend,
            surface: parts.surface,
            engines: parts.engines,
            address: parts.address,
            events: parts.events,
            store: SessionStore::new(initial),
            phase: PhaseMachine::new(),
            wake_lock: WakeLockManager::new(parts.wake_lock),
            resolution_guard: StaleGuard::new("resolution"),
            switch_guard: StaleGuard::new("source switch"),
            favorite_guard: StaleGuard::new("favorite lookup"),
            check_guard: StaleGuard::new("skip check"),
            advance_guard: StaleGuard::new("episode advance"),
            engine: tokio::sync::Mutex::new(None),
            scheduling: Mutex::new(scheduling),
            media: Mutex::new(media),
            mount_params: Mutex::new(RouteParams::default()),
            shutdown: CancellationToken::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.current()
    }

    pub fn phase_machine(&self) -> &PhaseMachine {
        &self.phase
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn wake_lock(&self) -> &WakeLockManager {
        &self.wake_lock
    }

    pub fn save_counts(&self) -> SaveCounts {
        self.scheduling().progress.counts()
    }

    pub fn is_torn_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// URI the active engine is bound to, if any.
    pub async fn active_uri(&self) -> Option<String> {
        self.engine.lock().await.as_ref().map(|active| active.uri.clone())
    }

    /// Wait until the phase leaves `Resolving`/`Switching`, returning the new phase.
    pub async fn wait_until_settled(&self) -> SessionPhase {
        let mut subscriber = self.phase.property().subscribe();
        loop {
            let phase = self.phase.current();
            if !matches!(phase, SessionPhase::Resolving | SessionPhase::Switching) {
                return phase;
            }
            if !subscriber.wait_for_change().await {
                return self.phase.current();
            }
        }
    }

    fn scheduling(&self) -> MutexGuard<'_, Scheduling> {
        self.scheduling
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn media(&self) -> MutexGuard<'_, MediaState> {
        self.media
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_live(&self) -> SessionResult<()> {
        if self.shutdown.is_cancelled() {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Gate for user-initiated mutations of a committed session.
    fn ensure_mutable(&self, operation: &'static str) -> SessionResult<()> {
        self.ensure_live()?;
        match self.phase.current() {
            SessionPhase::Error(message) => Err(SessionError::Halted(message)),
            phase if phase.is_interactive() => Ok(()),
            from => Err(SessionError::InvalidTransition { from, operation }),
        }
    }

    /// Apply a phase transition result and publish the change.
    async fn enter(&self, transition: SessionResult<SessionPhase>) -> SessionResult<()> {
        let from = transition?;
        let to = self.phase.current();
        if from != to
            && let Err(e) = self.events.emit_phase_changed(from.as_str(), to.as_str()).await
        {
            warn!("Failed to publish phase change: {}", e);
        }
        Ok(())
    }

    async fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        if let Err(e) = self.events.emit_notification(level, message).await {
            warn!("Failed to publish notification: {}", e);
        }
    }
}
