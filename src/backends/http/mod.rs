use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::playlist::filter_ad_segments;
use super::traits::{
    ChangeSourceRequest, ChangeSourceResolution, FavoriteEntry, FavoriteRecord, FavoriteState,
    IdentityResolution, PlaybackBackend, PlayerConfigUpdate, ProgressRecord, QueryRequest,
    QueryResolution, SkipConfigResult,
};
use crate::config::BackendConfig;
use crate::models::{ContentId, SkipConfig, SourceKey};
use crate::scheduling::{PreloadDecision, PreloadQuery};

#[cfg(test)]
mod tests;

const FETCH_ATTEMPTS: u32 = 2;
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// JSON-over-HTTP implementation of the playback backend.
///
/// Session capabilities are served by the storage/search service under
/// `base_url`; manifests and segments are fetched directly from their CDN.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

#[derive(Serialize)]
struct ResolveBody<'a> {
    source: &'a SourceKey,
    id: &'a ContentId,
    title_hint: &'a str,
}

#[derive(Serialize)]
struct SkipConfigBody<'a> {
    source: &'a SourceKey,
    id: &'a ContentId,
    #[serde(flatten)]
    config: &'a SkipConfig,
}

#[derive(Deserialize)]
struct SaveResponse {
    saved: bool,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid backend URL: {}", config.base_url))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        info!("Using playback backend at {}", base);

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(USER_AGENT, &self.user_agent)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            error!("Request failed - Status: {}, URL: {}", response.status(), url);
            return Err(anyhow!("{} failed: {}", path, response.status()));
        }

        Ok(response.json().await?)
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            error!("Request failed - Status: {}, URL: {}", response.status(), url);
            return Err(anyhow!("{} failed: {}", path, response.status()));
        }

        Ok(response.json().await?)
    }

    fn media_headers(&self, uri: &str, segment: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let host = Url::parse(uri)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        if host.ends_with("douban.com") || host.ends_with("doubanio.com") {
            headers.insert(REFERER, HeaderValue::from_static("https://www.douban.com/"));
        }
        if segment {
            headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));
        }
        headers
    }

    async fn fetch_with_retry(&self, uri: &str, headers: HeaderMap) -> Result<reqwest::Response> {
        let mut attempt = 1;
        loop {
            match self.client.get(uri).headers(headers.clone()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    return Err(anyhow!("Fetching {} failed: {}", uri, response.status()));
                }
                Err(e) if attempt < FETCH_ATTEMPTS => {
                    warn!("Fetching {} failed (attempt {}): {}", uri, attempt, e);
                    attempt += 1;
                    tokio::time::sleep(FETCH_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl PlaybackBackend for HttpBackend {
    async fn resolve_by_identity(
        &self,
        source: &SourceKey,
        id: &ContentId,
        title_hint: &str,
    ) -> Result<IdentityResolution> {
        self.post_json(
            "/api/play/resolve",
            &ResolveBody {
                source,
                id,
                title_hint,
            },
        )
        .await
    }

    async fn resolve_by_query(&self, request: &QueryRequest) -> Result<QueryResolution> {
        self.post_json("/api/play/query", request).await
    }

    async fn change_source(
        &self,
        request: &ChangeSourceRequest,
    ) -> Result<ChangeSourceResolution> {
        self.post_json("/api/play/change-source", request).await
    }

    async fn fetch_filtered_manifest(&self, uri: &str, ad_filter_enabled: bool) -> Result<String> {
        let response = self
            .fetch_with_retry(uri, self.media_headers(uri, false))
            .await?;
        let body = response.bytes().await?;
        let text = String::from_utf8(body.to_vec())
            .with_context(|| format!("Manifest at {} is not valid UTF-8", uri))?;

        if ad_filter_enabled {
            Ok(filter_ad_segments(&text))
        } else {
            Ok(text)
        }
    }

    async fn fetch_binary(&self, uri: &str) -> Result<Bytes> {
        let response = self
            .fetch_with_retry(uri, self.media_headers(uri, true))
            .await?;
        Ok(response.bytes().await?)
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<bool> {
        let response: SaveResponse = self.post_json("/api/play/progress", record).await?;
        Ok(response.saved)
    }

    async fn apply_skip_config(
        &self,
        source: &SourceKey,
        id: &ContentId,
        config: &SkipConfig,
    ) -> Result<SkipConfigResult> {
        self.post_json("/api/skip-config", &SkipConfigBody { source, id, config })
            .await
    }

    async fn decide_preload(&self, query: &PreloadQuery) -> Result<PreloadDecision> {
        self.post_json("/api/play/preload", query).await
    }

    async fn toggle_favorite(&self, record: &FavoriteRecord) -> Result<FavoriteState> {
        self.post_json("/api/favorites/toggle", record).await
    }

    async fn list_favorites(&self) -> Result<Vec<FavoriteEntry>> {
        self.get_json("/api/favorites").await
    }

    async fn update_player_config(&self, update: &PlayerConfigUpdate) -> Result<()> {
        let url = format!("{}/api/player-config", self.base_url);
        let response = self
            .client
            .put(&url)
            .header(USER_AGENT, &self.user_agent)
            .json(update)
            .send()
            .await?;

        if !response.status().is_success() {
            error!("Failed to update player config - Status: {}", response.status());
            return Err(anyhow!("Failed to update player config: {}", response.status()));
        }
        Ok(())
    }
}
