use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

use crate::models::{ContentId, SkipConfig, SourceKey};

/// Immutable copy of the session parameters an asynchronous request was
/// issued with. Compared field by field against the live session when the
/// request completes.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    source: SourceKey,
    content_id: ContentId,
    episode_index: usize,
    title: String,
    year: String,
    /// Mapping-valued parameters (the skip rule). Compared structurally, so
    /// key order never matters.
    params: Map<String, Value>,
}

impl RequestSnapshot {
    pub fn new(
        source: SourceKey,
        content_id: ContentId,
        episode_index: usize,
        title: String,
        year: String,
        skip_config: &SkipConfig,
    ) -> Self {
        let mut params = Map::new();
        params.insert("skip_enabled".to_string(), Value::from(skip_config.enabled));
        params.insert("skip_intro".to_string(), Value::from(skip_config.intro_seconds));
        params.insert("skip_outro".to_string(), Value::from(skip_config.outro_seconds));
        Self::with_params(source, content_id, episode_index, title, year, params)
    }

    pub fn with_params(
        source: SourceKey,
        content_id: ContentId,
        episode_index: usize,
        title: String,
        year: String,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            source,
            content_id,
            episode_index,
            title,
            year,
            params,
        }
    }

    pub fn source(&self) -> &SourceKey {
        &self.source
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    pub fn episode_index(&self) -> usize {
        self.episode_index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

/// Handle for one in-flight request.
#[derive(Debug, Clone)]
pub struct GuardToken {
    id: u64,
    label: &'static str,
    snapshot: RequestSnapshot,
    issued_at: Instant,
}

impl GuardToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn snapshot(&self) -> &RequestSnapshot {
        &self.snapshot
    }
}

/// Decides whether the result of a completed request still describes what
/// the session currently holds.
///
/// One guard is kept per request kind so `is_latest` only compares requests
/// of the same kind.
#[derive(Debug)]
pub struct StaleGuard {
    label: &'static str,
    next_id: AtomicU64,
    latest: AtomicU64,
}

impl StaleGuard {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_id: AtomicU64::new(1),
            latest: AtomicU64::new(0),
        }
    }

    pub fn begin(&self, snapshot: RequestSnapshot) -> GuardToken {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.latest.store(id, Ordering::SeqCst);
        GuardToken {
            id,
            label: self.label,
            snapshot,
            issued_at: Instant::now(),
        }
    }

    /// True iff `current` equals the snapshot captured at `begin`.
    pub fn accept(&self, token: &GuardToken, current: &RequestSnapshot) -> bool {
        let accepted = token.snapshot == *current;
        if !accepted {
            debug!(
                "Discarding stale {} result #{} after {:?} (issued for {}+{} episode {}, now {}+{} episode {})",
                token.label,
                token.id,
                token.issued_at.elapsed(),
                token.snapshot.source,
                token.snapshot.content_id,
                token.snapshot.episode_index,
                current.source,
                current.content_id,
                current.episode_index
            );
        }
        accepted
    }

    /// Whether no newer request of this kind was issued after `token`.
    pub fn is_latest(&self, token: &GuardToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.id
    }
}
