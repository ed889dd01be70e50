use super::types::{
    EventPayload, EventPriority, EventType, NotificationLevel, SessionEvent, SkipKind,
};
use crate::models::SessionAddress;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<SessionEvent>,
    filter: Option<EventFilter>,
}

impl EventSubscriber {
    pub fn new(receiver: broadcast::Receiver<SessionEvent>, filter: Option<EventFilter>) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<SessionEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }

    fn accepts(&self, event: &SessionEvent) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(event))
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    event_types: Option<Vec<EventType>>,
    min_priority: Option<EventPriority>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_min_priority(mut self, priority: EventPriority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn matches(&self, event: &SessionEvent) -> bool {
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }

        if let Some(min_priority) = self.min_priority
            && event.priority < min_priority
        {
            return false;
        }

        true
    }
}

/// Broadcasts session events to any number of observers
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
    stats: Arc<RwLock<EventBusStats>>,
    event_history: Arc<RwLock<Vec<SessionEvent>>>,
    max_history_size: usize,
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub subscriber_count: usize,
    pub dropped_events: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            max_history_size: 100,
        }
    }

    pub async fn publish(&self, event: SessionEvent) -> Result<()> {
        trace!(
            "Publishing event: {:?} with priority {:?}",
            event.event_type, event.priority
        );

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());
            if history.len() > self.max_history_size {
                let excess = history.len() - self.max_history_size;
                history.drain(0..excess);
            }
        }

        if self.sender.send(event).is_err() {
            // No subscribers is normal
            self.stats.write().await.dropped_events += 1;
        }
        Ok(())
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(filter))
    }

    pub fn subscribe_to_types(&self, types: Vec<EventType>) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::new().with_types(types))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn get_stats(&self) -> EventBusStats {
        let stats = self.stats.read().await;
        EventBusStats {
            subscriber_count: self.subscriber_count(),
            ..stats.clone()
        }
    }

    pub async fn get_history(&self) -> Vec<SessionEvent> {
        self.event_history.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.event_history.write().await.clear();
    }

    pub async fn emit_notification(
        &self,
        level: NotificationLevel,
        message: impl Into<String>,
    ) -> Result<()> {
        let priority = match level {
            NotificationLevel::Error => EventPriority::High,
            _ => EventPriority::Normal,
        };
        let event = SessionEvent::new(
            EventType::Notification,
            EventPayload::Notification {
                level,
                message: message.into(),
            },
        )
        .with_priority(priority);
        self.publish(event).await
    }

    pub async fn emit_phase_changed(&self, from: &str, to: &str) -> Result<()> {
        let event = SessionEvent::new(
            EventType::PhaseChanged,
            EventPayload::Phase {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
        self.publish(event).await
    }

    pub async fn emit_address_changed(&self, address: SessionAddress) -> Result<()> {
        let event = SessionEvent::new(EventType::AddressChanged, EventPayload::Address(address));
        self.publish(event).await
    }

    pub async fn emit_progress_saved(
        &self,
        trigger: &str,
        episode_index: usize,
        play_seconds: f64,
        persisted: bool,
    ) -> Result<()> {
        let event = SessionEvent::new(
            EventType::ProgressSaved,
            EventPayload::Progress {
                trigger: trigger.to_string(),
                episode_index,
                play_seconds,
                persisted,
            },
        )
        .with_priority(EventPriority::Low);
        self.publish(event).await
    }

    pub async fn emit_skip_applied(&self, kind: SkipKind, target_seconds: Option<f64>) -> Result<()> {
        let event = SessionEvent::new(
            EventType::SkipApplied,
            EventPayload::Skip {
                kind,
                target_seconds,
            },
        );
        self.publish(event).await
    }

    pub async fn emit_preload_triggered(&self, next_episode: usize) -> Result<()> {
        let event = SessionEvent::new(
            EventType::PreloadTriggered,
            EventPayload::Preload { next_episode },
        )
        .with_priority(EventPriority::Low);
        self.publish(event).await
    }

    pub async fn emit_episode_changed(&self, from: usize, to: usize) -> Result<()> {
        let event = SessionEvent::new(EventType::EpisodeChanged, EventPayload::Episode { from, to });
        self.publish(event).await
    }

    pub async fn emit_source_switched(&self, address: &SessionAddress) -> Result<()> {
        let event = SessionEvent::new(
            EventType::SourceSwitched,
            EventPayload::Source {
                source: address.source.clone(),
                id: address.id.clone(),
            },
        );
        self.publish(event).await
    }

    pub async fn emit_favorite_changed(&self, favorited: bool) -> Result<()> {
        let event = SessionEvent::new(
            EventType::FavoriteChanged,
            EventPayload::Favorite { favorited },
        );
        self.publish(event).await
    }
}
