#![cfg(test)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::backends::{
    ChangeSourceRequest, ChangeSourceResolution, FavoriteEntry, FavoriteRecord, FavoriteState,
    IdentityResolution, PlaybackBackend, PlayerConfigUpdate, ProgressRecord, QueryRequest,
    QueryResolution, SkipConfigResult,
};
use crate::config::EngineConfig;
use crate::controller::AddressSink;
use crate::models::{ContentDetail, ContentId, SessionAddress, SkipConfig, SourceKey};
use crate::player::{
    EngineFactory, LoadStats, LoaderCallbacks, LoaderError, LoaderRequest, LoaderResponse,
    MediaLoader, RenderSurface, StreamingEngine, WakeLockHandle, WakeLockPlatform,
};
use crate::scheduling::{PreloadDecision, PreloadQuery};

/// Common test utilities
pub mod common {
    use std::time::Duration;
    use tokio::time::sleep;

    /// Wait for a condition to become true
    pub async fn wait_for<F>(mut condition: F, max_wait: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = tokio::time::Instant::now();

        while start.elapsed() < max_wait {
            if condition() {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }

        condition()
    }
}

/// Catalog entry with `episodes` playable URIs.
pub fn sample_detail(source: &str, id: &str, episodes: usize) -> ContentDetail {
    ContentDetail {
        id: id.into(),
        source: source.into(),
        source_name: format!("{} source", source),
        title: "Sample Show".to_string(),
        poster: format!("https://img.test/{}/{}.jpg", source, id),
        episodes: (0..episodes)
            .map(|i| format!("https://cdn.test/{}/{}/{}.m3u8", source, id, i))
            .collect(),
        year: Some("2024".to_string()),
        ..ContentDetail::default()
    }
}

pub fn identity_resolution(detail: ContentDetail) -> IdentityResolution {
    IdentityResolution {
        available_sources: vec![detail.clone()],
        detail,
        resume_seconds: None,
        initial_episode_index: None,
        favorited: false,
        skip_config: None,
        ad_filter_enabled: true,
        preload_enabled: true,
    }
}

/// Holds a mocked call until opened.
#[derive(Debug, Clone)]
pub struct Gate {
    sender: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn open(&self) {
        self.sender.send_replace(true);
    }

    async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Default)]
struct BackendState {
    manifests: HashMap<String, String>,
    binaries: HashMap<String, Bytes>,
    identities: HashMap<(String, String), IdentityResolution>,
    identity_error: Option<String>,
    query: Option<QueryResolution>,
    query_error: Option<String>,
    switches: HashMap<String, ChangeSourceResolution>,
    switch_error: Option<String>,
    save_declined: bool,
    save_error: bool,
    skip_deleted: bool,
    skip_error: bool,
    preload: bool,
    favorites: Vec<FavoriteEntry>,
    favorites_error: bool,
    player_config_error: bool,

    binary_gates: HashMap<String, Gate>,
    identity_gate: Option<Gate>,
    query_gate: Option<Gate>,
    switch_gates: HashMap<String, Gate>,

    manifest_calls: Vec<(String, bool)>,
    binary_calls: Vec<String>,
    identity_calls: Vec<(SourceKey, ContentId)>,
    query_calls: Vec<QueryRequest>,
    switch_calls: Vec<ChangeSourceRequest>,
    progress_saves: Vec<ProgressRecord>,
    skip_configs: Vec<(SourceKey, ContentId, SkipConfig)>,
    skip_checks: u32,
    preload_queries: Vec<PreloadQuery>,
    favorite_toggles: Vec<FavoriteRecord>,
    player_config_updates: Vec<PlayerConfigUpdate>,
}

/// Scriptable in-memory backend. Every call is recorded; selected calls can
/// be held behind a [`Gate`] to force out-of-order completion.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<BackendState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    pub fn set_manifest(&self, uri: &str, text: &str) {
        self.state().manifests.insert(uri.to_string(), text.to_string());
    }

    pub fn set_binary(&self, uri: &str, data: Vec<u8>) {
        self.state().binaries.insert(uri.to_string(), Bytes::from(data));
    }

    pub fn set_identity(&self, resolution: IdentityResolution) {
        let key = (
            resolution.detail.source.to_string(),
            resolution.detail.id.to_string(),
        );
        self.state().identities.insert(key, resolution);
    }

    pub fn fail_identity(&self, message: &str) {
        self.state().identity_error = Some(message.to_string());
    }

    pub fn clear_identity_failure(&self) {
        self.state().identity_error = None;
    }

    pub fn set_query(&self, resolution: QueryResolution) {
        self.state().query = Some(resolution);
    }

    pub fn fail_query(&self, message: &str) {
        self.state().query_error = Some(message.to_string());
    }

    pub fn set_switch(&self, resolution: ChangeSourceResolution) {
        let key = resolution.detail.id.to_string();
        self.state().switches.insert(key, resolution);
    }

    pub fn fail_switch(&self, message: &str) {
        self.state().switch_error = Some(message.to_string());
    }

    pub fn decline_saves(&self) {
        self.state().save_declined = true;
    }

    pub fn fail_saves(&self) {
        self.state().save_error = true;
    }

    pub fn set_skip_deleted(&self, deleted: bool) {
        self.state().skip_deleted = deleted;
    }

    pub fn fail_skip_config(&self) {
        self.state().skip_error = true;
    }

    pub fn set_preload(&self, did_preload: bool) {
        self.state().preload = did_preload;
    }

    pub fn set_favorites(&self, keys: &[&str]) {
        self.state().favorites = keys
            .iter()
            .map(|key| FavoriteEntry {
                key: key.to_string(),
                title: String::new(),
            })
            .collect();
    }

    pub fn fail_favorites(&self) {
        self.state().favorites_error = true;
    }

    pub fn fail_player_config(&self) {
        self.state().player_config_error = true;
    }

    pub fn gate_binary(&self, uri: &str) -> Gate {
        let gate = Gate::new();
        self.state().binary_gates.insert(uri.to_string(), gate.clone());
        gate
    }

    pub fn gate_identity(&self) -> Gate {
        let gate = Gate::new();
        self.state().identity_gate = Some(gate.clone());
        gate
    }

    pub fn gate_query(&self) -> Gate {
        let gate = Gate::new();
        self.state().query_gate = Some(gate.clone());
        gate
    }

    pub fn gate_switch(&self, new_id: &str) -> Gate {
        let gate = Gate::new();
        self.state().switch_gates.insert(new_id.to_string(), gate.clone());
        gate
    }

    pub fn manifest_calls(&self) -> Vec<(String, bool)> {
        self.state().manifest_calls.clone()
    }

    pub fn binary_calls(&self) -> Vec<String> {
        self.state().binary_calls.clone()
    }

    pub fn identity_calls(&self) -> Vec<(SourceKey, ContentId)> {
        self.state().identity_calls.clone()
    }

    pub fn query_calls(&self) -> Vec<QueryRequest> {
        self.state().query_calls.clone()
    }

    pub fn switch_calls(&self) -> Vec<ChangeSourceRequest> {
        self.state().switch_calls.clone()
    }

    pub fn progress_saves(&self) -> Vec<ProgressRecord> {
        self.state().progress_saves.clone()
    }

    pub fn skip_configs(&self) -> Vec<(SourceKey, ContentId, SkipConfig)> {
        self.state().skip_configs.clone()
    }

    pub fn skip_checks(&self) -> u32 {
        self.state().skip_checks
    }

    pub fn preload_queries(&self) -> Vec<PreloadQuery> {
        self.state().preload_queries.clone()
    }

    pub fn favorite_toggles(&self) -> Vec<FavoriteRecord> {
        self.state().favorite_toggles.clone()
    }

    pub fn player_config_updates(&self) -> Vec<PlayerConfigUpdate> {
        self.state().player_config_updates.clone()
    }
}

#[async_trait]
impl PlaybackBackend for MockBackend {
    async fn resolve_by_identity(
        &self,
        source: &SourceKey,
        id: &ContentId,
        _title_hint: &str,
    ) -> Result<IdentityResolution> {
        let gate = {
            let mut state = self.state();
            state.identity_calls.push((source.clone(), id.clone()));
            state.identity_gate.clone()
        };
        if let Some(gate) = gate {
            gate.wait().await;
        }

        let state = self.state();
        if let Some(message) = &state.identity_error {
            return Err(anyhow!(message.clone()));
        }
        state
            .identities
            .get(&(source.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("unknown entry {}+{}", source, id))
    }

    async fn resolve_by_query(&self, request: &QueryRequest) -> Result<QueryResolution> {
        let gate = {
            let mut state = self.state();
            state.query_calls.push(request.clone());
            state.query_gate.clone()
        };
        if let Some(gate) = gate {
            gate.wait().await;
        }

        let state = self.state();
        if let Some(message) = &state.query_error {
            return Err(anyhow!(message.clone()));
        }
        Ok(state.query.clone().unwrap_or_default())
    }

    async fn change_source(
        &self,
        request: &ChangeSourceRequest,
    ) -> Result<ChangeSourceResolution> {
        let gate = {
            let mut state = self.state();
            state.switch_calls.push(request.clone());
            state.switch_gates.get(request.new_id.as_str()).cloned()
        };
        if let Some(gate) = gate {
            gate.wait().await;
        }

        let state = self.state();
        if let Some(message) = &state.switch_error {
            return Err(anyhow!(message.clone()));
        }
        state
            .switches
            .get(request.new_id.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("no alternative {}", request.new_id))
    }

    async fn fetch_filtered_manifest(&self, uri: &str, ad_filter_enabled: bool) -> Result<String> {
        let mut state = self.state();
        state.manifest_calls.push((uri.to_string(), ad_filter_enabled));
        state
            .manifests
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("manifest not found: {}", uri))
    }

    async fn fetch_binary(&self, uri: &str) -> Result<Bytes> {
        let gate = {
            let mut state = self.state();
            state.binary_calls.push(uri.to_string());
            state.binary_gates.get(uri).cloned()
        };
        if let Some(gate) = gate {
            gate.wait().await;
        }

        self.state()
            .binaries
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("segment not found: {}", uri))
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<bool> {
        let mut state = self.state();
        if state.save_error {
            return Err(anyhow!("storage unavailable"));
        }
        state.progress_saves.push(record.clone());
        Ok(!state.save_declined)
    }

    async fn apply_skip_config(
        &self,
        source: &SourceKey,
        id: &ContentId,
        config: &SkipConfig,
    ) -> Result<SkipConfigResult> {
        let mut state = self.state();
        if state.skip_error {
            return Err(anyhow!("storage unavailable"));
        }
        state.skip_configs.push((source.clone(), id.clone(), *config));
        Ok(SkipConfigResult {
            deleted: state.skip_deleted,
        })
    }

    async fn compute_skip_action(
        &self,
        intro_seconds: f64,
        outro_seconds: f64,
        current_seconds: f64,
        total_seconds: f64,
    ) -> Result<crate::scheduling::SkipDecision> {
        self.state().skip_checks += 1;
        Ok(crate::scheduling::compute_skip_action(
            intro_seconds,
            outro_seconds,
            current_seconds,
            total_seconds,
        ))
    }

    async fn decide_preload(&self, query: &PreloadQuery) -> Result<PreloadDecision> {
        let mut state = self.state();
        state.preload_queries.push(query.clone());
        Ok(PreloadDecision {
            did_preload: state.preload,
        })
    }

    async fn toggle_favorite(&self, record: &FavoriteRecord) -> Result<FavoriteState> {
        let mut state = self.state();
        if state.favorites_error {
            return Err(anyhow!("storage unavailable"));
        }
        state.favorite_toggles.push(record.clone());

        let existing = state.favorites.iter().position(|f| f.key == record.key);
        let favorited = match existing {
            Some(position) => {
                state.favorites.remove(position);
                false
            }
            None => {
                state.favorites.push(FavoriteEntry {
                    key: record.key.clone(),
                    title: record.title.clone(),
                });
                true
            }
        };
        Ok(FavoriteState { favorited })
    }

    async fn list_favorites(&self) -> Result<Vec<FavoriteEntry>> {
        let state = self.state();
        if state.favorites_error {
            return Err(anyhow!("storage unavailable"));
        }
        Ok(state.favorites.clone())
    }

    async fn update_player_config(&self, update: &PlayerConfigUpdate) -> Result<()> {
        let mut state = self.state();
        if state.player_config_error {
            return Err(anyhow!("storage unavailable"));
        }
        state.player_config_updates.push(*update);
        Ok(())
    }
}

/// Records loader completions.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    successes: Mutex<Vec<(LoaderResponse, LoadStats)>>,
    errors: Mutex<Vec<LoaderError>>,
}

impl RecordingCallbacks {
    pub fn total(&self) -> usize {
        self.successes.lock().unwrap().len() + self.errors.lock().unwrap().len()
    }

    pub async fn wait_for(&self, count: usize) {
        let reached =
            common::wait_for(|| self.total() >= count, std::time::Duration::from_secs(2)).await;
        assert!(reached, "expected {} loader callbacks, got {}", count, self.total());
    }

    pub fn successes(&self) -> Vec<LoaderResponse> {
        self.successes
            .lock()
            .unwrap()
            .iter()
            .map(|(response, _)| response.clone())
            .collect()
    }

    pub fn stats(&self) -> Vec<LoadStats> {
        self.successes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, stats)| *stats)
            .collect()
    }

    pub fn errors(&self) -> Vec<LoaderError> {
        self.errors.lock().unwrap().clone()
    }
}

impl LoaderCallbacks for RecordingCallbacks {
    fn on_success(&self, response: LoaderResponse, stats: &LoadStats, _request: &LoaderRequest) {
        self.successes.lock().unwrap().push((response, *stats));
    }

    fn on_error(&self, error: LoaderError, _request: &LoaderRequest) {
        self.errors.lock().unwrap().push(error);
    }
}

/// Wake-lock platform that counts requests and releases.
#[derive(Debug)]
pub struct MockWakeLock {
    supported: bool,
    failing: bool,
    next_handle: AtomicU64,
    requests: AtomicU32,
    releases: AtomicU32,
}

impl MockWakeLock {
    fn build(supported: bool, failing: bool) -> Self {
        Self {
            supported,
            failing,
            next_handle: AtomicU64::new(1),
            requests: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }

    pub fn new() -> Self {
        Self::build(true, false)
    }

    pub fn unsupported() -> Self {
        Self::build(false, false)
    }

    pub fn failing() -> Self {
        Self::build(true, true)
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> u32 {
        let granted = if self.failing { 0 } else { self.requests() };
        granted - self.releases()
    }
}

#[async_trait]
impl WakeLockPlatform for MockWakeLock {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request(&self) -> Result<WakeLockHandle> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(anyhow!("wake lock denied"));
        }
        Ok(WakeLockHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    async fn release(&self, _handle: WakeLockHandle) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct SurfaceState {
    current_time: f64,
    duration: f64,
    paused: bool,
    volume: f64,
    rate: f64,
    seeks: Vec<f64>,
    pause_calls: u32,
}

/// Rendering surface whose clock is driven by the test.
#[derive(Debug)]
pub struct MockSurface {
    state: Mutex<SurfaceState>,
}

impl Default for MockSurface {
    fn default() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                current_time: 0.0,
                duration: 0.0,
                paused: true,
                volume: 1.0,
                rate: 1.0,
                seeks: Vec::new(),
                pause_calls: 0,
            }),
        }
    }
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, current_time: f64, duration: f64) {
        let mut state = self.state.lock().unwrap();
        state.current_time = current_time;
        state.duration = duration;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn pause_calls(&self) -> u32 {
        self.state.lock().unwrap().pause_calls
    }

    pub fn applied_volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }

    pub fn applied_rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }
}

#[async_trait]
impl RenderSurface for MockSurface {
    async fn play(&self) -> Result<()> {
        self.state.lock().unwrap().paused = false;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.paused = true;
        state.pause_calls += 1;
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.current_time = seconds;
        state.seeks.push(seconds);
        Ok(())
    }

    async fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    async fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    async fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    async fn volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.state.lock().unwrap().volume = volume;
        Ok(())
    }

    async fn playback_rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.state.lock().unwrap().rate = rate;
        Ok(())
    }
}

/// What happened to one engine instance built by [`MockEngineFactory`].
#[derive(Debug)]
pub struct EngineRecord {
    pub loader: Arc<dyn MediaLoader>,
    uri: Mutex<Option<String>>,
    start_loads: AtomicU32,
    recoveries: AtomicU32,
    destroyed: AtomicBool,
}

impl EngineRecord {
    pub fn uri(&self) -> Option<String> {
        self.uri.lock().unwrap().clone()
    }

    pub fn start_loads(&self) -> u32 {
        self.start_loads.load(Ordering::SeqCst)
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockEngine {
    record: Arc<EngineRecord>,
}

#[async_trait]
impl StreamingEngine for MockEngine {
    async fn load_source(&self, uri: &str) -> Result<()> {
        *self.record.uri.lock().unwrap() = Some(uri.to_string());
        Ok(())
    }

    async fn start_load(&self) -> Result<()> {
        self.record.start_loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recover_media_error(&self) -> Result<()> {
        self.record.recoveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) {
        self.record.destroyed.store(true, Ordering::SeqCst);
        self.record.loader.abort();
    }
}

#[derive(Debug, Default)]
pub struct MockEngineFactory {
    engines: Mutex<Vec<Arc<EngineRecord>>>,
    configs: Mutex<Vec<EngineConfig>>,
    fail_create: AtomicBool,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn engines(&self) -> Vec<Arc<EngineRecord>> {
        self.engines.lock().unwrap().clone()
    }

    pub fn configs(&self) -> Vec<EngineConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(
        &self,
        loader: Arc<dyn MediaLoader>,
        config: &EngineConfig,
    ) -> Result<Box<dyn StreamingEngine>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("engine unsupported"));
        }
        let record = Arc::new(EngineRecord {
            loader,
            uri: Mutex::new(None),
            start_loads: AtomicU32::new(0),
            recoveries: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
        });
        self.engines.lock().unwrap().push(record.clone());
        self.configs.lock().unwrap().push(config.clone());
        Ok(Box::new(MockEngine { record }))
    }
}

/// Address sink that keeps every replacement.
#[derive(Debug, Default)]
pub struct RecordingAddressSink {
    addresses: Mutex<Vec<SessionAddress>>,
}

impl RecordingAddressSink {
    pub fn addresses(&self) -> Vec<SessionAddress> {
        self.addresses.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SessionAddress> {
        self.addresses.lock().unwrap().last().cloned()
    }
}

impl AddressSink for RecordingAddressSink {
    fn replace(&self, address: &SessionAddress) {
        self.addresses.lock().unwrap().push(address.clone());
    }
}
