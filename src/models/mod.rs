mod content;
mod identifiers;

pub use content::{ContentDetail, SkipConfig, SourceMetrics};
pub use identifiers::{ContentId, SourceKey, storage_key};

use serde::{Deserialize, Serialize};

/// Parameters the play view is opened with, either from its address or from
/// the page that handed off to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteParams {
    #[serde(default)]
    pub source: SourceKey,
    #[serde(default)]
    pub id: ContentId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
    /// Title to search with when no identity is known.
    #[serde(default)]
    pub search_title: String,
    /// Type hint forwarded to query resolution (e.g. "tv", "movie").
    #[serde(default)]
    pub search_type: String,
    /// Force query resolution with best-source selection even if an identity is set.
    #[serde(default)]
    pub prefer: bool,
}

impl RouteParams {
    pub fn for_identity(source: impl Into<SourceKey>, id: impl Into<ContentId>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn for_query(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.source.is_empty() && !self.id.is_empty()
    }

    /// Text used for query resolution: the search title wins over the display title.
    pub fn query(&self) -> &str {
        if self.search_title.is_empty() {
            &self.title
        } else {
            &self.search_title
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_identity() && self.title.is_empty() && self.search_title.is_empty()
    }
}

/// The navigable (URL-equivalent) projection of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAddress {
    pub source: SourceKey,
    pub id: ContentId,
    pub year: String,
    pub title: String,
}
