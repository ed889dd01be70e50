use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::Property;
use crate::models::{ContentDetail, ContentId, SessionAddress, SkipConfig, SourceKey, SourceMetrics};

use super::guard::RequestSnapshot;

/// Full value of a playback session, used for `replace` and for reads that
/// need a consistent view of every field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub source: SourceKey,
    pub content_id: ContentId,
    pub title: String,
    pub year: String,
    pub cover: String,
    pub douban_id: Option<i64>,
    pub search_title: String,
    pub search_type: String,
    pub detail: Option<Arc<ContentDetail>>,
    pub available_sources: Vec<ContentDetail>,
    pub source_metrics: HashMap<String, SourceMetrics>,
    pub episode_index: usize,
    pub resume_target: Option<f64>,
    pub skip_config: SkipConfig,
    pub ad_filter_enabled: bool,
    pub preload_enabled: bool,
    pub favorited: bool,
}

impl Session {
    /// Build the session described by a resolved detail record.
    pub fn from_detail(detail: ContentDetail) -> Self {
        Self {
            source: detail.source.clone(),
            content_id: detail.id.clone(),
            title: detail.title.clone(),
            year: detail.year_or_empty().to_string(),
            cover: detail.poster.clone(),
            douban_id: detail.douban_id,
            detail: Some(Arc::new(detail)),
            ..Self::default()
        }
    }

    pub fn current_uri(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .and_then(|d| d.episode_uri(self.episode_index))
    }

    pub fn source_name(&self) -> &str {
        self.detail.as_deref().map_or("", |d| d.source_name.as_str())
    }

    pub fn episode_count(&self) -> usize {
        self.detail.as_deref().map_or(0, ContentDetail::episode_count)
    }

    pub fn has_identity(&self) -> bool {
        !self.source.is_empty() && !self.content_id.is_empty()
    }
}

/// Partial update. Fields left `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub episode_index: Option<usize>,
    pub resume_target: Option<Option<f64>>,
    pub skip_config: Option<SkipConfig>,
    pub ad_filter_enabled: Option<bool>,
    pub preload_enabled: Option<bool>,
    pub favorited: Option<bool>,
    pub source_metrics: Option<HashMap<String, SourceMetrics>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn episode_index(mut self, index: usize) -> Self {
        self.episode_index = Some(index);
        self
    }

    pub fn resume_target(mut self, target: Option<f64>) -> Self {
        self.resume_target = Some(target);
        self
    }

    pub fn skip_config(mut self, config: SkipConfig) -> Self {
        self.skip_config = Some(config);
        self
    }

    pub fn ad_filter_enabled(mut self, enabled: bool) -> Self {
        self.ad_filter_enabled = Some(enabled);
        self
    }

    pub fn preload_enabled(mut self, enabled: bool) -> Self {
        self.preload_enabled = Some(enabled);
        self
    }

    pub fn favorited(mut self, favorited: bool) -> Self {
        self.favorited = Some(favorited);
        self
    }

    pub fn source_metrics(mut self, metrics: HashMap<String, SourceMetrics>) -> Self {
        self.source_metrics = Some(metrics);
        self
    }
}

/// Session State Store.
///
/// Each field lives in its own [`Property`] so partial updates touch only the
/// named slots and subscribers of other slots are not woken. Writers hold
/// `write_lock` so `replace` is observed as one step by `snapshot`/`current`.
#[derive(Debug)]
pub struct SessionStore {
    write_lock: Mutex<()>,
    source: Property<SourceKey>,
    content_id: Property<ContentId>,
    title: Property<String>,
    year: Property<String>,
    cover: Property<String>,
    douban_id: Property<Option<i64>>,
    search_title: Property<String>,
    search_type: Property<String>,
    detail: Property<Option<Arc<ContentDetail>>>,
    available_sources: Property<Vec<ContentDetail>>,
    source_metrics: Property<HashMap<String, SourceMetrics>>,
    episode_index: Property<usize>,
    resume_target: Property<Option<f64>>,
    skip_config: Property<SkipConfig>,
    ad_filter_enabled: Property<bool>,
    preload_enabled: Property<bool>,
    favorited: Property<bool>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Session::default())
    }
}

impl SessionStore {
    pub fn new(initial: Session) -> Self {
        let episode_index = bounded_index(initial.detail.as_deref(), initial.episode_index);
        Self {
            write_lock: Mutex::new(()),
            source: Property::new(initial.source, "source"),
            content_id: Property::new(initial.content_id, "content_id"),
            title: Property::new(initial.title, "title"),
            year: Property::new(initial.year, "year"),
            cover: Property::new(initial.cover, "cover"),
            douban_id: Property::new(initial.douban_id, "douban_id"),
            search_title: Property::new(initial.search_title, "search_title"),
            search_type: Property::new(initial.search_type, "search_type"),
            detail: Property::new(initial.detail, "detail"),
            available_sources: Property::new(initial.available_sources, "available_sources"),
            source_metrics: Property::new(initial.source_metrics, "source_metrics"),
            episode_index: Property::new(episode_index, "episode_index"),
            resume_target: Property::new(initial.resume_target, "resume_target"),
            skip_config: Property::new(initial.skip_config, "skip_config"),
            ad_filter_enabled: Property::new(initial.ad_filter_enabled, "ad_filter_enabled"),
            preload_enabled: Property::new(initial.preload_enabled, "preload_enabled"),
            favorited: Property::new(initial.favorited, "favorited"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Swap every field. The resume target becomes exactly the provided value.
    pub fn replace(&self, session: Session) {
        let _guard = self.lock();
        let index = bounded_index(session.detail.as_deref(), session.episode_index);

        self.source.set(session.source);
        self.content_id.set(session.content_id);
        self.title.set(session.title);
        self.year.set(session.year);
        self.cover.set(session.cover);
        self.douban_id.set(session.douban_id);
        self.search_title.set(session.search_title);
        self.search_type.set(session.search_type);
        self.detail.set(session.detail);
        self.available_sources.set(session.available_sources);
        self.source_metrics.set(session.source_metrics);
        self.episode_index.set(index);
        self.resume_target.set(session.resume_target);
        self.skip_config.set(session.skip_config);
        self.ad_filter_enabled.set(session.ad_filter_enabled);
        self.preload_enabled.set(session.preload_enabled);
        self.favorited.set(session.favorited);
    }

    /// Update only the named fields. Returns the committed episode index when
    /// the patch carried one (after bounding).
    pub fn patch(&self, patch: SessionPatch) -> Option<usize> {
        let _guard = self.lock();

        let committed_index = patch.episode_index.map(|requested| {
            let index = self.detail.with(|d| bounded_index(d.as_deref(), requested));
            self.episode_index.set_if_changed(index);
            index
        });
        if let Some(target) = patch.resume_target {
            self.resume_target.set(target);
        }
        if let Some(config) = patch.skip_config {
            self.skip_config.set_if_changed(config);
        }
        if let Some(enabled) = patch.ad_filter_enabled {
            self.ad_filter_enabled.set_if_changed(enabled);
        }
        if let Some(enabled) = patch.preload_enabled {
            self.preload_enabled.set_if_changed(enabled);
        }
        if let Some(favorited) = patch.favorited {
            self.favorited.set_if_changed(favorited);
        }
        if let Some(metrics) = patch.source_metrics {
            self.source_metrics.set(metrics);
        }

        committed_index
    }

    /// Take the one-shot resume target, leaving `None` behind.
    pub fn consume_resume_target(&self) -> Option<f64> {
        let _guard = self.lock();
        if self.resume_target.with(Option::is_none) {
            return None;
        }
        self.resume_target.replace(None)
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        let _guard = self.lock();
        RequestSnapshot::new(
            self.source.get(),
            self.content_id.get(),
            self.episode_index.get(),
            self.title.get(),
            self.year.get(),
            &self.skip_config.get(),
        )
    }

    pub fn current(&self) -> Session {
        let _guard = self.lock();
        Session {
            source: self.source.get(),
            content_id: self.content_id.get(),
            title: self.title.get(),
            year: self.year.get(),
            cover: self.cover.get(),
            douban_id: self.douban_id.get(),
            search_title: self.search_title.get(),
            search_type: self.search_type.get(),
            detail: self.detail.get(),
            available_sources: self.available_sources.get(),
            source_metrics: self.source_metrics.get(),
            episode_index: self.episode_index.get(),
            resume_target: self.resume_target.get(),
            skip_config: self.skip_config.get(),
            ad_filter_enabled: self.ad_filter_enabled.get(),
            preload_enabled: self.preload_enabled.get(),
            favorited: self.favorited.get(),
        }
    }

    pub fn address(&self) -> SessionAddress {
        let _guard = self.lock();
        SessionAddress {
            source: self.source.get(),
            id: self.content_id.get(),
            year: self.year.get(),
            title: self.title.get(),
        }
    }

    /// Playable URI of the current episode, if a detail is committed.
    pub fn current_uri(&self) -> Option<String> {
        let _guard = self.lock();
        let index = self.episode_index.get();
        self.detail
            .with(|d| d.as_deref().and_then(|d| d.episode_uri(index)).map(str::to_string))
    }

    pub fn has_next_episode(&self) -> bool {
        let index = self.episode_index.get();
        self.detail
            .with(|d| d.as_deref().is_some_and(|d| d.has_next(index)))
    }

    pub fn episode_count(&self) -> usize {
        self.detail
            .with(|d| d.as_deref().map_or(0, ContentDetail::episode_count))
    }

    pub fn source(&self) -> &Property<SourceKey> {
        &self.source
    }

    pub fn content_id(&self) -> &Property<ContentId> {
        &self.content_id
    }

    pub fn title(&self) -> &Property<String> {
        &self.title
    }

    pub fn year(&self) -> &Property<String> {
        &self.year
    }

    pub fn detail(&self) -> &Property<Option<Arc<ContentDetail>>> {
        &self.detail
    }

    pub fn available_sources(&self) -> &Property<Vec<ContentDetail>> {
        &self.available_sources
    }

    pub fn source_metrics(&self) -> &Property<HashMap<String, SourceMetrics>> {
        &self.source_metrics
    }

    pub fn episode_index(&self) -> &Property<usize> {
        &self.episode_index
    }

    pub fn resume_target(&self) -> &Property<Option<f64>> {
        &self.resume_target
    }

    pub fn skip_config(&self) -> &Property<SkipConfig> {
        &self.skip_config
    }

    pub fn ad_filter_enabled(&self) -> &Property<bool> {
        &self.ad_filter_enabled
    }

    pub fn preload_enabled(&self) -> &Property<bool> {
        &self.preload_enabled
    }

    pub fn favorited(&self) -> &Property<bool> {
        &self.favorited
    }
}

fn bounded_index(detail: Option<&ContentDetail>, requested: usize) -> usize {
    match detail {
        Some(detail) => detail.clamp_episode(requested).unwrap_or(0),
        None => requested,
    }
}
