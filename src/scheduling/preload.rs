use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::models::{ContentId, SourceKey, storage_key};

/// Parameters of one "should the next episode be preloaded" question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadQuery {
    pub source: SourceKey,
    pub id: ContentId,
    pub current_episode: usize,
    pub total_episodes: usize,
    pub current_seconds: f64,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadDecision {
    pub did_preload: bool,
}

/// Preload Decision Engine.
///
/// The prefetch itself happens in the backend; this side only decides when
/// asking is meaningful and keeps track of what was reported.
#[derive(Debug, Default)]
pub struct PreloadTracker {
    reported: HashSet<(String, usize)>,
    asked: u64,
}

impl PreloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only sessions with more than one episode and a known duration are asked about.
    pub fn should_ask(total_episodes: usize, total_seconds: f64) -> bool {
        total_episodes > 1 && total_seconds > 0.0
    }

    pub fn note_asked(&mut self) {
        self.asked += 1;
    }

    /// Record a decision. Returns true the first time a preload is reported
    /// for a given episode.
    pub fn on_decision(&mut self, query: &PreloadQuery, decision: PreloadDecision) -> bool {
        if !decision.did_preload {
            return false;
        }

        let key = (storage_key(&query.source, &query.id), query.current_episode + 1);
        if self.reported.insert(key) {
            info!(
                "Next episode {} of {} preloaded for {}+{}",
                query.current_episode + 2,
                query.total_episodes,
                query.source,
                query.id
            );
            true
        } else {
            debug!("Preload already reported for episode {}", query.current_episode + 2);
            false
        }
    }

    pub fn asked(&self) -> u64 {
        self.asked
    }

    pub fn reported(&self) -> usize {
        self.reported.len()
    }
}
