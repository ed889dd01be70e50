use serde::{Deserialize, Serialize};

use super::{ContentId, SourceKey};

/// A resolved catalog entry: the playable episode list of one title on one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDetail {
    pub id: ContentId,
    pub source: SourceKey,
    #[serde(default)]
    pub source_name: String,
    pub title: String,
    #[serde(default)]
    pub poster: String,
    /// Playable URIs, one per episode.
    pub episodes: Vec<String>,
    /// Display titles parallel to `episodes`; may be shorter.
    #[serde(default)]
    pub episodes_titles: Vec<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub douban_id: Option<i64>,
}

impl ContentDetail {
    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    pub fn episode_uri(&self, index: usize) -> Option<&str> {
        self.episodes.get(index).map(String::as_str)
    }

    pub fn episode_title(&self, index: usize) -> Option<&str> {
        self.episodes_titles.get(index).map(String::as_str)
    }

    pub fn has_next(&self, index: usize) -> bool {
        index + 1 < self.episodes.len()
    }

    pub fn year_or_empty(&self) -> &str {
        self.year.as_deref().unwrap_or("")
    }

    /// Clamp an episode index into `[0, episodes.len())`.
    ///
    /// Returns `None` when there are no episodes at all.
    pub fn clamp_episode(&self, index: usize) -> Option<usize> {
        if self.episodes.is_empty() {
            None
        } else {
            Some(index.min(self.episodes.len() - 1))
        }
    }

    pub fn is_same_entry(&self, source: &SourceKey, id: &ContentId) -> bool {
        &self.source == source && &self.id == id
    }
}

/// Intro/outro skip rule for one catalog entry.
///
/// `outro_seconds` is a negative offset measured back from the end of the
/// episode; zero means no outro rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipConfig {
    pub enabled: bool,
    pub intro_seconds: f64,
    pub outro_seconds: f64,
}

impl SkipConfig {
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn has_intro(&self) -> bool {
        self.intro_seconds > 0.0
    }

    pub fn has_outro(&self) -> bool {
        self.outro_seconds < 0.0
    }
}

/// Speed-test result for one alternative source, produced by query resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub quality: String,
    pub load_speed: String,
    pub ping_ms: u64,
    #[serde(default)]
    pub had_error: bool,
}
