use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ContentDetail, ContentId, SkipConfig, SourceKey, SourceMetrics};
use crate::scheduling::skip::{self, SkipDecision};
use crate::scheduling::{PreloadDecision, PreloadQuery};

/// Combined detail/favorite/skip/preferences lookup for a known identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityResolution {
    pub detail: ContentDetail,
    #[serde(default)]
    pub available_sources: Vec<ContentDetail>,
    #[serde(default)]
    pub resume_seconds: Option<f64>,
    /// Episode recorded in the play record, if any
    #[serde(default)]
    pub initial_episode_index: Option<usize>,
    #[serde(default)]
    pub favorited: bool,
    #[serde(default)]
    pub skip_config: Option<SkipConfig>,
    #[serde(default = "default_true")]
    pub ad_filter_enabled: bool,
    #[serde(default = "default_true")]
    pub preload_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Results whose title does not match this are dropped
    pub filter_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    pub prefer_best: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResolution {
    /// Candidates, best first
    #[serde(default)]
    pub results: Vec<ContentDetail>,
    /// Speed-test results keyed by `"{source}-{id}"`
    #[serde(default)]
    pub test_results: HashMap<String, SourceMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSourceRequest {
    pub prev_source: Option<SourceKey>,
    pub prev_id: Option<ContentId>,
    pub new_source: SourceKey,
    pub new_id: ContentId,
    pub available_sources: Vec<ContentDetail>,
    pub current_episode_index: usize,
    pub current_play_seconds: f64,
    pub resume_seconds: Option<f64>,
    pub skip_config: SkipConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSourceResolution {
    pub detail: ContentDetail,
    pub target_episode_index: usize,
    #[serde(default)]
    pub resume_seconds: Option<f64>,
}

/// One progress write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub source: SourceKey,
    pub id: ContentId,
    pub title: String,
    pub source_name: String,
    pub year: String,
    pub cover: String,
    pub episode_index: usize,
    pub total_episodes: usize,
    pub play_seconds: f64,
    pub total_seconds: f64,
    pub search_title: String,
    pub saved_at_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipConfigResult {
    /// The rule was empty and the stored record was removed
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub key: String,
    pub title: String,
    pub source_name: String,
    pub year: String,
    pub cover: String,
    /// 1-based
    pub episode: usize,
    pub total_episodes: usize,
    pub save_time_ms: i64,
    pub search_title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteState {
    pub favorited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub key: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfigUpdate {
    pub ad_filter_enabled: bool,
}

/// Capabilities the session controller consumes from storage, search and
/// the fetch/ad-filter service.
#[async_trait]
pub trait PlaybackBackend: Send + Sync + std::fmt::Debug {
    async fn resolve_by_identity(
        &self,
        source: &SourceKey,
        id: &ContentId,
        title_hint: &str,
    ) -> Result<IdentityResolution>;

    async fn resolve_by_query(&self, request: &QueryRequest) -> Result<QueryResolution>;

    async fn change_source(&self, request: &ChangeSourceRequest)
    -> Result<ChangeSourceResolution>;

    /// Manifest text after ad filtering. The flag is always forwarded; the
    /// implementation decides what "disabled" means.
    async fn fetch_filtered_manifest(&self, uri: &str, ad_filter_enabled: bool) -> Result<String>;

    async fn fetch_binary(&self, uri: &str) -> Result<Bytes>;

    /// Returns false when the record was not persisted (missing identifiers).
    async fn save_progress(&self, record: &ProgressRecord) -> Result<bool>;

    async fn apply_skip_config(
        &self,
        source: &SourceKey,
        id: &ContentId,
        config: &SkipConfig,
    ) -> Result<SkipConfigResult>;

    async fn compute_skip_action(
        &self,
        intro_seconds: f64,
        outro_seconds: f64,
        current_seconds: f64,
        total_seconds: f64,
    ) -> Result<SkipDecision> {
        Ok(skip::compute_skip_action(
            intro_seconds,
            outro_seconds,
            current_seconds,
            total_seconds,
        ))
    }

    async fn decide_preload(&self, query: &PreloadQuery) -> Result<PreloadDecision>;

    async fn toggle_favorite(&self, record: &FavoriteRecord) -> Result<FavoriteState>;

    async fn list_favorites(&self) -> Result<Vec<FavoriteEntry>>;

    async fn update_player_config(&self, update: &PlayerConfigUpdate) -> Result<()>;
}

fn default_true() -> bool {
    true
}
