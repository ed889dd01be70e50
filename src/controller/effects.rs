use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::{ActiveEngine, SessionController};
use crate::backends::ProgressRecord;
use crate::events::{NotificationLevel, SkipKind};
use crate::models::{SessionAddress, SkipConfig};
use crate::player::{
    BackendLoader, EngineErrorKind, EngineEvent, MediaLoader, WakeLockHandle,
};
use crate::scheduling::{PreloadQuery, PreloadTracker, SaveTrigger, SkipDecision, skip};
use crate::session::{SessionPatch, SessionPhase};
use crate::utils::{SessionError, SessionResult};

/// Seeking this close to the end would fire `Ended` immediately.
const RESUME_END_MARGIN: f64 = 2.0;
const RESUME_END_BACKOFF: f64 = 5.0;
const SETTING_EPSILON: f64 = 0.01;

impl SessionController {
    /// Bind an engine to the current episode URI. Without `force` nothing
    /// happens when the URI and ad-filter flag already match the active engine.
    pub(super) async fn sync_engine(&self, force: bool) {
        let uri = self.store.current_uri();
        let ad_filter_enabled = self.store.ad_filter_enabled().get();
        let mut active = self.engine.lock().await;

        if !force
            && let (Some(current), Some(uri)) = (active.as_ref(), uri.as_deref())
            && current.uri == uri
            && current.ad_filter_enabled == ad_filter_enabled
        {
            trace!("Engine already bound to {}", uri);
            return;
        }

        let previous_uri = active.as_ref().map(|current| current.uri.clone());
        if let Some(previous) = active.take() {
            debug!("Destroying engine for {}", previous.uri);
            previous.loader.abort();
            previous.engine.destroy().await;
        }

        let Some(uri) = uri else {
            debug!("No playable episode; engine left unbound");
            return;
        };
        if self.shutdown.is_cancelled() {
            return;
        }

        let loader = Arc::new(BackendLoader::new(self.backend.clone(), ad_filter_enabled));
        let engine = match self.engines.create(loader.clone(), &self.config.engine) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Failed to create streaming engine: {}", e);
                self.notify(NotificationLevel::Error, "Unable to start playback")
                    .await;
                return;
            }
        };

        info!("Loading {} (ad filter: {})", uri, ad_filter_enabled);
        if let Err(e) = engine.load_source(&uri).await {
            error!("Failed to load {}: {}", uri, e);
        }

        {
            let mut media = self.media();
            media.network_recoveries = 0;
            media.media_recoveries = 0;
            if previous_uri.as_deref() != Some(uri.as_str()) {
                media.rebuilt = false;
            }
        }
        {
            let mut scheduling = self.scheduling();
            scheduling.progress.restart();
            scheduling.check_throttle.reset();
        }

        *active = Some(ActiveEngine {
            uri,
            ad_filter_enabled,
            engine,
            loader,
        });
    }

    async fn destroy_engine(&self) {
        if let Some(previous) = self.engine.lock().await.take() {
            previous.loader.abort();
            previous.engine.destroy().await;
            debug!("Engine for {} destroyed", previous.uri);
        }
    }

    pub(super) async fn publish_address(&self) -> SessionAddress {
        let address = self.store.address();
        self.address.replace(&address);
        if let Err(e) = self.events.emit_address_changed(address.clone()).await {
            warn!("Failed to publish address: {}", e);
        }
        address
    }

    /// Feed a signal from the surface or the streaming engine.
    pub async fn handle_engine_event(self: &Arc<Self>, event: EngineEvent) {
        if self.shutdown.is_cancelled() {
            trace!("Ignoring {:?} after teardown", event);
            return;
        }

        match event {
            EngineEvent::Ready => self.on_ready().await,
            EngineEvent::Play => {
                self.observe(self.phase.played()).await;
                self.wake_lock.acquire().await;
            }
            EngineEvent::Pause => {
                self.observe(self.phase.paused()).await;
                self.wake_lock.release().await;
                self.save_progress(SaveTrigger::Pause).await;
            }
            EngineEvent::Ended => {
                self.wake_lock.release().await;
                self.observe(self.phase.ended()).await;
                if self.store.has_next_episode() {
                    self.schedule_advance(self.config.player.advance_delay());
                }
            }
            EngineEvent::TimeUpdate {
                current_seconds,
                duration_seconds,
            } => self.on_time_update(current_seconds, duration_seconds).await,
            EngineEvent::VolumeChanged(volume) => self.media().last_volume = volume,
            EngineEvent::RateChanged(rate) => self.media().last_rate = rate,
            EngineEvent::Error {
                kind,
                fatal,
                details,
            } => self.on_engine_error(kind, fatal, details).await,
        }
    }

    /// Apply a transition driven by the engine. Signals that do not fit the
    /// current phase (e.g. a late `play` from the outgoing source) are dropped.
    async fn observe(&self, transition: SessionResult<SessionPhase>) {
        if let Err(e) = self.enter(transition).await {
            debug!("Ignoring engine signal: {}", e);
        }
    }

    async fn on_ready(&self) {
        if let Some(target) = self.store.consume_resume_target()
            && target > 0.0
        {
            let duration = self.surface.duration().await;
            let position = if duration > 0.0 && target >= duration - RESUME_END_MARGIN {
                (duration - RESUME_END_BACKOFF).max(0.0)
            } else {
                target
            };
            debug!("Resuming at {:.1}s (requested {:.1}s)", position, target);
            if let Err(e) = self.surface.seek(position).await {
                warn!("Failed to seek to resume position: {}", e);
            }
        }

        let (volume, rate) = {
            let media = self.media();
            (media.last_volume, media.last_rate)
        };
        if (self.surface.volume().await - volume).abs() > SETTING_EPSILON
            && let Err(e) = self.surface.set_volume(volume).await
        {
            warn!("Failed to restore volume: {}", e);
        }
        if (self.surface.playback_rate().await - rate).abs() > SETTING_EPSILON
            && let Err(e) = self.surface.set_playback_rate(rate).await
        {
            warn!("Failed to restore playback rate: {}", e);
        }

        if !self.surface.is_paused().await {
            self.wake_lock.acquire().await;
        }
        self.scheduling().progress.restart();
    }

    async fn on_time_update(self: &Arc<Self>, current_seconds: f64, duration_seconds: f64) {
        if !self.phase.current().is_interactive() {
            return;
        }

        let interval_due = self.scheduling().progress.on_progress().is_some();
        if interval_due {
            self.save_progress(SaveTrigger::Interval).await;
        }

        if !self.scheduling().check_throttle.try_acquire() {
            return;
        }

        let config = self.store.skip_config().get();
        if skip::should_check(&config, duration_seconds) {
            self.run_skip_check(config, current_seconds, duration_seconds)
                .await;
        }

        if self.store.preload_enabled().get() {
            self.run_preload_check(current_seconds, duration_seconds)
                .await;
        }
    }

    async fn run_skip_check(self: &Arc<Self>, config: SkipConfig, current: f64, total: f64) {
        let token = self.check_guard.begin(self.store.snapshot());
        let decision = match self
            .backend
            .compute_skip_action(config.intro_seconds, config.outro_seconds, current, total)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Skip check failed: {}", e);
                return;
            }
        };
        if !self.check_guard.accept(&token, &self.store.snapshot()) {
            return;
        }

        match decision {
            SkipDecision::None => {}
            SkipDecision::SkipIntroTo { seconds } => {
                info!("Skipping intro to {:.1}s", seconds);
                if let Err(e) = self.surface.seek(seconds).await {
                    warn!("Failed to skip intro: {}", e);
                    return;
                }
                self.notify(NotificationLevel::Success, "Skipped intro").await;
                if let Err(e) = self.events.emit_skip_applied(SkipKind::Intro, Some(seconds)).await
                {
                    warn!("Failed to publish skip: {}", e);
                }
            }
            SkipDecision::SkipOutroAdvanceEpisode => {
                if self.advance_pending() {
                    return;
                }
                if let Err(e) = self.events.emit_skip_applied(SkipKind::Outro, None).await {
                    warn!("Failed to publish skip: {}", e);
                }
                if self.store.has_next_episode() {
                    info!("Skipping outro, advancing to next episode");
                    self.notify(NotificationLevel::Success, "Skipped outro, playing next episode")
                        .await;
                    self.schedule_advance(self.config.player.outro_advance_delay());
                } else {
                    info!("Skipping outro of the last episode");
                    self.notify(NotificationLevel::Info, "Last episode finished").await;
                    if let Err(e) = self.surface.pause().await {
                        warn!("Failed to pause at outro: {}", e);
                    }
                }
            }
        }
    }

    async fn run_preload_check(&self, current_seconds: f64, total_seconds: f64) {
        let total_episodes = self.store.episode_count();
        if !PreloadTracker::should_ask(total_episodes, total_seconds) {
            return;
        }

        let query = PreloadQuery {
            source: self.store.source().get(),
            id: self.store.content_id().get(),
            current_episode: self.store.episode_index().get(),
            total_episodes,
            current_seconds,
            total_seconds,
        };
        self.scheduling().preload.note_asked();

        match self.backend.decide_preload(&query).await {
            Ok(decision) => {
                let reported = self.scheduling().preload.on_decision(&query, decision);
                if reported
                    && let Err(e) = self
                        .events
                        .emit_preload_triggered(query.current_episode + 1)
                        .await
                {
                    warn!("Failed to publish preload: {}", e);
                }
            }
            Err(e) => warn!("Preload check failed: {}", e),
        }
    }

    fn advance_pending(&self) -> bool {
        self.scheduling()
            .pending_advance
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Advance to the next episode after `delay`, unless the session moved
    /// on or was torn down in the meantime. Replaces any pending advance.
    fn schedule_advance(self: &Arc<Self>, delay: Duration) {
        let token = self.advance_guard.begin(self.store.snapshot());
        let controller = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Pending episode advance cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let Some(controller) = controller.upgrade() else {
                        return;
                    };
                    if !controller.advance_guard.is_latest(&token)
                        || !controller
                            .advance_guard
                            .accept(&token, &controller.store.snapshot())
                    {
                        return;
                    }
                    if let Err(e) = controller.next_episode().await {
                        warn!("Failed to advance episode: {}", e);
                    }
                }
            }
        });

        if let Some(previous) = self.scheduling().pending_advance.replace(handle) {
            previous.abort();
        }
    }

    async fn on_engine_error(&self, kind: EngineErrorKind, fatal: bool, details: String) {
        if !fatal {
            debug!("Non-fatal {:?} engine error: {}", kind, details);
            return;
        }
        warn!("Fatal {:?} engine error: {}", kind, details);

        let limits = &self.config.engine;
        match kind {
            EngineErrorKind::Network => {
                let attempt = {
                    let mut media = self.media();
                    (media.network_recoveries < limits.max_network_recoveries).then(|| {
                        media.network_recoveries += 1;
                        media.network_recoveries
                    })
                };
                if let Some(attempt) = attempt
                    && let Some(active) = self.engine.lock().await.as_ref()
                {
                    info!("Restarting load after network error (attempt {})", attempt);
                    match active.engine.start_load().await {
                        Ok(()) => return,
                        Err(e) => warn!("Failed to restart load: {}", e),
                    }
                }
            }
            EngineErrorKind::Media => {
                let (recover, rebuild) = {
                    let mut media = self.media();
                    if media.media_recoveries < limits.max_media_recoveries {
                        media.media_recoveries += 1;
                        (true, false)
                    } else if !media.rebuilt {
                        media.rebuilt = true;
                        (false, true)
                    } else {
                        (false, false)
                    }
                };

                if recover && let Some(active) = self.engine.lock().await.as_ref() {
                    info!("Recovering from media error");
                    match active.engine.recover_media_error().await {
                        Ok(()) => return,
                        Err(e) => warn!("Media recovery failed: {}", e),
                    }
                }
                if rebuild {
                    info!("Rebuilding engine after repeated media errors");
                    let position = self.surface.current_time().await;
                    if position > 0.0 {
                        self.store
                            .patch(SessionPatch::new().resume_target(Some(position)));
                    }
                    self.sync_engine(true).await;
                    return;
                }
            }
            EngineErrorKind::Other => {}
        }

        self.destroy_engine().await;
        if self.surface.current_time().await <= 0.0 {
            if let Err(e) = self
                .fail(SessionError::Engine("Unable to play this video".to_string()))
                .await
            {
                debug!("Playback halted: {}", e);
            }
        } else {
            self.notify(NotificationLevel::Error, "Playback error, try another source")
                .await;
        }
    }

    /// Persist the current position. Failures are logged, never retried.
    pub async fn save_progress(&self, trigger: SaveTrigger) {
        let session = self.store.current();
        if !session.has_identity() || session.detail.is_none() {
            trace!("Nothing to save ({})", trigger);
            return;
        }
        if trigger.is_discrete() {
            self.scheduling().progress.on_discrete(trigger);
        }

        let play_seconds = self.surface.current_time().await;
        let total_seconds = self.surface.duration().await;
        let record = ProgressRecord {
            source: session.source.clone(),
            id: session.content_id.clone(),
            title: session.title.clone(),
            source_name: session.source_name().to_string(),
            year: session.year.clone(),
            cover: session.cover.clone(),
            episode_index: session.episode_index,
            total_episodes: session.episode_count(),
            play_seconds,
            total_seconds,
            search_title: session.search_title.clone(),
            saved_at_ms: chrono::Utc::now().timestamp_millis(),
        };

        match self.backend.save_progress(&record).await {
            Ok(persisted) => {
                self.scheduling().progress.record_saved(persisted);
                if !persisted {
                    debug!("Progress not persisted ({})", trigger);
                }
                if let Err(e) = self
                    .events
                    .emit_progress_saved(
                        &trigger.to_string(),
                        session.episode_index,
                        play_seconds,
                        persisted,
                    )
                    .await
                {
                    warn!("Failed to publish progress save: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to save progress ({}): {}", trigger, e);
                self.scheduling().progress.record_failure();
            }
        }
    }

    pub async fn on_visibility_changed(&self, visible: bool) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if visible {
            if !self.surface.is_paused().await {
                self.wake_lock.acquire().await;
            }
        } else {
            self.save_progress(SaveTrigger::Hidden).await;
            self.wake_lock.release().await;
        }
    }

    /// The platform dropped the wake lock on its own.
    pub async fn on_wake_lock_released(&self, handle: WakeLockHandle) {
        self.wake_lock.on_released(handle).await;
    }

    /// Page unload: same cleanup as teardown, recorded with its own trigger.
    pub async fn on_unload(&self) {
        self.shut_down(SaveTrigger::Unload).await;
    }

    /// Save, release the wake lock, destroy the engine and cancel every
    /// pending timer. Idempotent.
    pub async fn teardown(&self) {
        self.shut_down(SaveTrigger::Teardown).await;
    }

    async fn shut_down(&self, trigger: SaveTrigger) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        let pending = self.scheduling().pending_advance.take();
        if let Some(handle) = pending {
            handle.abort();
        }

        self.save_progress(trigger).await;
        self.wake_lock.release().await;
        self.destroy_engine().await;

        if let Err(e) = self.enter(self.phase.torn_down()).await {
            warn!("Failed to record teardown: {}", e);
        }
        info!("Session torn down ({})", trigger);
    }
}
