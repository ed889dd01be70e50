use serde::{Deserialize, Serialize};

use crate::models::{ContentId, SessionAddress, SourceKey};

/// Event published by a session controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: String,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub priority: EventPriority,
}

impl SessionEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
            priority: EventPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    PhaseChanged,
    /// Transient user-facing message (toast)
    Notification,
    AddressChanged,
    ProgressSaved,
    SkipApplied,
    PreloadTriggered,
    EpisodeChanged,
    SourceSwitched,
    FavoriteChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PhaseChanged => "phase_changed",
            EventType::Notification => "notification",
            EventType::AddressChanged => "address_changed",
            EventType::ProgressSaved => "progress_saved",
            EventType::SkipApplied => "skip_applied",
            EventType::PreloadTriggered => "preload_triggered",
            EventType::EpisodeChanged => "episode_changed",
            EventType::SourceSwitched => "source_switched",
            EventType::FavoriteChanged => "favorite_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SkipKind {
    Intro,
    Outro,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventPayload {
    Phase {
        from: String,
        to: String,
    },
    Notification {
        level: NotificationLevel,
        message: String,
    },
    Address(SessionAddress),
    Progress {
        trigger: String,
        episode_index: usize,
        play_seconds: f64,
        persisted: bool,
    },
    Skip {
        kind: SkipKind,
        target_seconds: Option<f64>,
    },
    Preload {
        next_episode: usize,
    },
    Episode {
        from: usize,
        to: usize,
    },
    Source {
        source: SourceKey,
        id: ContentId,
    },
    Favorite {
        favorited: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Low,
    Normal,
    High,
}
