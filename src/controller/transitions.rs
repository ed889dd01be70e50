use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::SessionController;
use crate::backends::{
    ChangeSourceRequest, FavoriteRecord, IdentityResolution, PlayerConfigUpdate, QueryRequest,
    QueryResolution,
};
use crate::events::NotificationLevel;
use crate::models::{ContentId, RouteParams, SkipConfig, SourceKey, storage_key};
use crate::scheduling::SaveTrigger;
use crate::session::{Session, SessionPatch, SessionPhase};
use crate::utils::{SessionError, SessionResult, format_time};

/// Resolutions discarded in a row because the session moved before giving up.
const MAX_RESOLUTION_ATTEMPTS: usize = 3;

impl SessionController {
    /// Enter the session from route parameters: `Idle -> Resolving -> Ready`.
    pub async fn mount(self: &Arc<Self>, params: RouteParams) -> SessionResult<()> {
        self.ensure_live()?;
        self.enter(self.phase.begin_resolving()).await?;

        *self.mount_params_lock() = params.clone();
        self.store.replace(Session {
            source: params.source.clone(),
            content_id: params.id.clone(),
            title: params.title.clone(),
            year: params.year.clone(),
            search_title: params.search_title.clone(),
            search_type: params.search_type.clone(),
            ad_filter_enabled: self.store.ad_filter_enabled().get(),
            preload_enabled: self.store.preload_enabled().get(),
            ..Session::default()
        });

        self.resolve(params).await
    }

    /// Leave `Error` and resolve again with the last mount parameters, or
    /// with the committed identity when one exists.
    pub async fn retry(self: &Arc<Self>) -> SessionResult<()> {
        self.ensure_live()?;
        if !self.phase.current().is_error() {
            return Err(SessionError::InvalidTransition {
                from: self.phase.current(),
                operation: "retry",
            });
        }

        let mut params = self.mount_params_lock().clone();
        let session = self.store.current();
        if session.has_identity() && session.detail.is_some() {
            params = RouteParams {
                title: session.title.clone(),
                year: session.year.clone(),
                search_title: session.search_title.clone(),
                search_type: session.search_type.clone(),
                ..RouteParams::for_identity(session.source.clone(), session.content_id.clone())
            };
        }

        info!("Retrying resolution for {:?}", params.query());
        self.enter(self.phase.begin_resolving()).await?;
        self.resolve(params).await
    }

    async fn resolve(self: &Arc<Self>, params: RouteParams) -> SessionResult<()> {
        if params.is_empty() {
            return self.fail(SessionError::MissingParameters).await;
        }

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let token = self.resolution_guard.begin(self.store.snapshot());
            let outcome = self.fetch_resolution(&params).await;

            self.ensure_live()?;
            if self.resolution_guard.accept(&token, &self.store.snapshot()) {
                break outcome;
            }
            if !self.resolution_guard.is_latest(&token)
                || self.phase.current() != SessionPhase::Resolving
            {
                return Ok(());
            }
            if attempts >= MAX_RESOLUTION_ATTEMPTS {
                return self
                    .fail(SessionError::Resolution(
                        "The session kept changing while loading".to_string(),
                    ))
                    .await;
            }
            debug!("Session moved during resolution, resolving again");
        };

        let resolved = match outcome {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Resolution failed: {}", e);
                return self.fail(SessionError::Backend(e)).await;
            }
        };

        let query_path = matches!(resolved, Resolved::Query(_));
        let session = match resolved {
            Resolved::Identity(resolution) => self.session_from_identity(&params, resolution),
            Resolved::Query(resolution) => self.session_from_query(&params, resolution),
        };
        let Some(session) = session else {
            return self
                .fail(SessionError::NotFound(params.query().to_string()))
                .await;
        };

        info!(
            "Resolved {} ({}+{}, {} episodes)",
            session.title,
            session.source,
            session.content_id,
            session.episode_count()
        );
        self.store.replace(session);
        self.mount_params_lock().prefer = false;
        self.enter(self.phase.resolved()).await?;
        self.publish_address().await;

        if query_path {
            self.refresh_favorite().await;
        }
        self.sync_engine(false).await;
        Ok(())
    }

    async fn fetch_resolution(&self, params: &RouteParams) -> anyhow::Result<Resolved> {
        if params.has_identity() && !params.prefer {
            debug!("Resolving {}+{}", params.source, params.id);
            return self
                .backend
                .resolve_by_identity(&params.source, &params.id, &params.title)
                .await
                .map(Resolved::Identity);
        }

        let request = QueryRequest {
            query: params.query().to_string(),
            filter_title: if params.title.is_empty() {
                params.query().to_string()
            } else {
                params.title.clone()
            },
            year: Some(params.year.clone()).filter(|y| !y.is_empty()),
            type_hint: Some(params.search_type.clone()).filter(|t| !t.is_empty()),
            prefer_best: params.prefer || self.config.player.prefer_best_source,
        };
        debug!("Resolving by query {:?}", request.query);
        self.backend
            .resolve_by_query(&request)
            .await
            .map(Resolved::Query)
    }

    fn session_from_identity(
        &self,
        params: &RouteParams,
        resolution: IdentityResolution,
    ) -> Option<Session> {
        if resolution.detail.episodes.is_empty() {
            return None;
        }
        let mut session = Session::from_detail(resolution.detail);
        if session.title.is_empty() {
            session.title = params.title.clone();
        }
        if session.year.is_empty() {
            session.year = params.year.clone();
        }
        session.search_title = params.search_title.clone();
        session.search_type = params.search_type.clone();
        session.available_sources = resolution.available_sources;
        session.episode_index = resolution
            .initial_episode_index
            .unwrap_or_else(|| self.store.episode_index().get());
        session.resume_target = resolution.resume_seconds;
        session.skip_config = resolution.skip_config.unwrap_or_default();
        session.ad_filter_enabled = resolution.ad_filter_enabled;
        session.preload_enabled = resolution.preload_enabled;
        session.favorited = resolution.favorited;
        Some(session)
    }

    fn session_from_query(
        &self,
        params: &RouteParams,
        resolution: QueryResolution,
    ) -> Option<Session> {
        let QueryResolution {
            mut results,
            test_results,
        } = resolution;
        results.retain(|candidate| !candidate.episodes.is_empty());
        let best = results.first()?.clone();
        let current_index = self.store.episode_index().get();
        let episode_index = if current_index < best.episode_count() {
            current_index
        } else {
            0
        };

        let mut session = Session::from_detail(best);
        if session.title.is_empty() {
            session.title = params.title.clone();
        }
        session.search_title = params.search_title.clone();
        session.search_type = params.search_type.clone();
        session.episode_index = episode_index;
        session.ad_filter_enabled = self.store.ad_filter_enabled().get();
        session.preload_enabled = self.store.preload_enabled().get();
        session.source_metrics = test_results;
        session.available_sources = results;
        Some(session)
    }

    pub(super) async fn fail(&self, error: SessionError) -> SessionResult<()> {
        let message = error.user_message();
        warn!("Session halted: {}", error);
        self.enter(self.phase.fail(message.clone())).await?;
        self.notify(NotificationLevel::Error, message).await;
        Err(error)
    }

    /// Select an episode of the committed detail. Out-of-range indices are
    /// clamped to the last episode.
    pub async fn select_episode(self: &Arc<Self>, index: usize) -> SessionResult<()> {
        self.ensure_mutable("select_episode")?;

        let Some(detail) = self.store.detail().get() else {
            return Err(SessionError::NoDetail);
        };
        let Some(target) = detail.clamp_episode(index) else {
            return Err(SessionError::NoDetail);
        };

        let previous = self.store.episode_index().get();
        if target == previous {
            return Ok(());
        }

        if self.surface.is_paused().await {
            self.save_progress(SaveTrigger::EpisodeChange).await;
        }

        let committed = self
            .store
            .patch(SessionPatch::new().episode_index(target).resume_target(None))
            .unwrap_or(target);
        info!("Episode {} -> {}", previous + 1, committed + 1);

        self.enter(self.phase.episode_selected()).await?;
        if let Err(e) = self.events.emit_episode_changed(previous, committed).await {
            warn!("Failed to publish episode change: {}", e);
        }
        self.sync_engine(false).await;
        Ok(())
    }

    pub async fn next_episode(self: &Arc<Self>) -> SessionResult<()> {
        if !self.store.has_next_episode() {
            return Ok(());
        }
        self.select_episode(self.store.episode_index().get() + 1).await
    }

    pub async fn previous_episode(self: &Arc<Self>) -> SessionResult<()> {
        match self.store.episode_index().get().checked_sub(1) {
            Some(index) => self.select_episode(index).await,
            None => Ok(()),
        }
    }

    /// Switch to another source of the same title, carrying the episode and
    /// play position over through the backend.
    pub async fn switch_source(
        self: &Arc<Self>,
        source: SourceKey,
        id: ContentId,
    ) -> SessionResult<()> {
        self.ensure_mutable("switch_source")?;
        let current = self.store.current();
        if current.source == source && current.content_id == id {
            return Ok(());
        }
        self.enter(self.phase.begin_switch()).await?;

        let token = self.switch_guard.begin(self.store.snapshot());
        let current_play_seconds = self.surface.current_time().await;
        let request = ChangeSourceRequest {
            prev_source: Some(current.source.clone()).filter(|s| !s.is_empty()),
            prev_id: Some(current.content_id.clone()).filter(|i| !i.is_empty()),
            new_source: source.clone(),
            new_id: id.clone(),
            available_sources: current.available_sources.clone(),
            current_episode_index: current.episode_index,
            current_play_seconds,
            resume_seconds: current.resume_target,
            skip_config: current.skip_config,
        };

        info!(
            "Switching source {}+{} -> {}+{} at {}",
            current.source,
            current.content_id,
            source,
            id,
            format_time(current_play_seconds)
        );
        let outcome = self.backend.change_source(&request).await;

        self.ensure_live()?;
        if !self.switch_guard.is_latest(&token) {
            debug!("Source switch to {}+{} superseded", source, id);
            return Ok(());
        }
        if !self.switch_guard.accept(&token, &self.store.snapshot()) {
            if self.phase.current() == SessionPhase::Switching {
                self.enter(self.phase.switch_abandoned()).await?;
            }
            return Ok(());
        }

        let resolution = match outcome {
            Ok(resolution) => resolution,
            Err(e) => {
                error!("Source switch failed: {}", e);
                return self.fail(SessionError::Backend(e)).await;
            }
        };
        if resolution.detail.episodes.is_empty() {
            warn!("Source {}+{} has no episodes", source, id);
            return self
                .fail(SessionError::NotFound(format!("{}+{}", source, id)))
                .await;
        }

        let mut session = Session::from_detail(resolution.detail);
        if session.title.is_empty() {
            session.title = current.title.clone();
        }
        session.search_title = current.search_title;
        session.search_type = current.search_type;
        session.available_sources = current.available_sources;
        session.source_metrics = current.source_metrics;
        session.episode_index = resolution.target_episode_index;
        session.resume_target = resolution.resume_seconds;
        session.skip_config = current.skip_config;
        session.ad_filter_enabled = current.ad_filter_enabled;
        session.preload_enabled = current.preload_enabled;
        self.store.replace(session);

        if self.phase.current() == SessionPhase::Switching {
            self.enter(self.phase.switched()).await?;
        }
        let address = self.publish_address().await;
        if let Err(e) = self.events.emit_source_switched(&address).await {
            warn!("Failed to publish source switch: {}", e);
        }
        self.refresh_favorite().await;
        self.sync_engine(false).await;
        Ok(())
    }

    /// Re-derive `favorited` for the committed identity.
    pub(super) async fn refresh_favorite(&self) {
        let token = self.favorite_guard.begin(self.store.snapshot());
        let key = storage_key(&self.store.source().get(), &self.store.content_id().get());

        match self.backend.list_favorites().await {
            Ok(entries) => {
                if !self.favorite_guard.accept(&token, &self.store.snapshot()) {
                    return;
                }
                let favorited = entries.iter().any(|entry| entry.key == key);
                self.store.patch(SessionPatch::new().favorited(favorited));
            }
            Err(e) => warn!("Failed to look up favorites: {}", e),
        }
    }

    pub async fn toggle_favorite(&self) -> SessionResult<()> {
        self.ensure_mutable("toggle_favorite")?;
        let session = self.store.current();
        if !session.has_identity() {
            return Err(SessionError::NoDetail);
        }

        let record = FavoriteRecord {
            key: storage_key(&session.source, &session.content_id),
            title: session.title.clone(),
            source_name: session.source_name().to_string(),
            year: session.year.clone(),
            cover: session.cover.clone(),
            episode: session.episode_index + 1,
            total_episodes: session.episode_count(),
            save_time_ms: chrono::Utc::now().timestamp_millis(),
            search_title: session.search_title.clone(),
        };

        let token = self.favorite_guard.begin(self.store.snapshot());
        match self.backend.toggle_favorite(&record).await {
            Ok(state) => {
                if self.favorite_guard.accept(&token, &self.store.snapshot()) {
                    self.store.patch(SessionPatch::new().favorited(state.favorited));
                    if let Err(e) = self.events.emit_favorite_changed(state.favorited).await {
                        warn!("Failed to publish favorite change: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to toggle favorite: {}", e);
                self.notify(NotificationLevel::Error, "Failed to update favorites")
                    .await;
                Err(SessionError::Backend(e))
            }
        }
    }

    /// Replace the skip rule. The store is updated before the backend call so
    /// the next time-progress signal already uses the new rule.
    pub async fn update_skip_config(&self, config: SkipConfig) -> SessionResult<()> {
        self.ensure_mutable("update_skip_config")?;
        let source = self.store.source().get();
        let id = self.store.content_id().get();
        if source.is_empty() || id.is_empty() {
            return Err(SessionError::NoDetail);
        }

        self.store.patch(SessionPatch::new().skip_config(config));

        match self.backend.apply_skip_config(&source, &id, &config).await {
            Ok(result) => {
                let message = if result.deleted {
                    "Skip settings cleared".to_string()
                } else {
                    skip_summary(&config)
                };
                self.notify(NotificationLevel::Success, message).await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to save skip settings: {}", e);
                self.notify(NotificationLevel::Error, "Failed to save skip settings")
                    .await;
                Err(SessionError::Backend(e))
            }
        }
    }

    pub async fn toggle_skip_enabled(&self) -> SessionResult<()> {
        let config = self.store.skip_config().get();
        self.update_skip_config(SkipConfig {
            enabled: !config.enabled,
            ..config
        })
        .await
    }

    /// Use the current position as the end of the intro.
    pub async fn set_intro_point(&self) -> SessionResult<()> {
        let current = self.surface.current_time().await;
        if current <= 0.0 {
            return Ok(());
        }
        let config = self.store.skip_config().get();
        self.update_skip_config(SkipConfig {
            enabled: true,
            intro_seconds: current,
            ..config
        })
        .await
    }

    /// Use the current position as the start of the outro.
    pub async fn set_outro_point(&self) -> SessionResult<()> {
        let current = self.surface.current_time().await;
        let duration = self.surface.duration().await;
        let outro = -(duration - current);
        if duration <= 0.0 || outro >= 0.0 {
            return Ok(());
        }
        let config = self.store.skip_config().get();
        self.update_skip_config(SkipConfig {
            enabled: true,
            outro_seconds: outro,
            ..config
        })
        .await
    }

    pub async fn clear_skip_config(&self) -> SessionResult<()> {
        self.update_skip_config(SkipConfig::cleared()).await
    }

    /// Flip ad filtering, persist it, and rebuild the engine at the current
    /// position so the manifest is fetched again with the new flag.
    pub async fn toggle_ad_filter(self: &Arc<Self>) -> SessionResult<()> {
        self.ensure_mutable("toggle_ad_filter")?;
        let previous = self.store.ad_filter_enabled().get();
        let enabled = !previous;
        self.store.patch(SessionPatch::new().ad_filter_enabled(enabled));

        if let Err(e) = self
            .backend
            .update_player_config(&PlayerConfigUpdate {
                ad_filter_enabled: enabled,
            })
            .await
        {
            error!("Failed to save ad filter setting: {}", e);
            self.store.patch(SessionPatch::new().ad_filter_enabled(previous));
            self.notify(NotificationLevel::Error, "Failed to change ad filtering")
                .await;
            return Err(SessionError::Backend(e));
        }

        let current = self.surface.current_time().await;
        if current > 0.0 {
            self.store
                .patch(SessionPatch::new().resume_target(Some(current)));
        }
        let message = if enabled {
            "Ad filtering enabled"
        } else {
            "Ad filtering disabled"
        };
        self.notify(NotificationLevel::Info, message).await;
        self.sync_engine(true).await;
        Ok(())
    }

    fn mount_params_lock(&self) -> std::sync::MutexGuard<'_, RouteParams> {
        self.mount_params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Resolved {
    Identity(IdentityResolution),
    Query(QueryResolution),
}

fn skip_summary(config: &SkipConfig) -> String {
    let mut parts = Vec::new();
    if config.has_intro() {
        parts.push(format!("intro until {}", format_time(config.intro_seconds)));
    }
    if config.has_outro() {
        parts.push(format!(
            "outro from {} before end",
            format_time(config.outro_seconds.abs())
        ));
    }
    if parts.is_empty() {
        "Skip settings saved".to_string()
    } else if config.enabled {
        format!("Skipping {}", parts.join(", "))
    } else {
        format!("Skip disabled ({})", parts.join(", "))
    }
}
