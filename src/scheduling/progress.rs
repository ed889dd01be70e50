use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Why a progress save was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// Minimum interval elapsed during playback
    Interval,
    Pause,
    /// Document visibility lost
    Hidden,
    /// Episode changed while paused
    EpisodeChange,
    Teardown,
    Unload,
}

impl SaveTrigger {
    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::Interval)
    }
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interval => "interval",
            Self::Pause => "pause",
            Self::Hidden => "hidden",
            Self::EpisodeChange => "episode_change",
            Self::Teardown => "teardown",
            Self::Unload => "unload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveCounts {
    pub interval: u64,
    pub discrete: u64,
    pub persisted: u64,
    pub failed: u64,
}

/// Progress Persistence Scheduler.
///
/// Interval saves are decided against an anchor that only interval saves
/// move; discrete saves always happen and leave the anchor alone.
#[derive(Debug)]
pub struct ProgressScheduler {
    interval: Duration,
    anchor: Instant,
    counts: SaveCounts,
}

impl ProgressScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            anchor: Instant::now(),
            counts: SaveCounts::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restart the interval window, e.g. when a new stream becomes ready.
    pub fn restart(&mut self) {
        self.anchor = Instant::now();
    }

    /// Called on every time-progress signal. Returns the trigger to save with
    /// when the interval has elapsed.
    pub fn on_progress(&mut self) -> Option<SaveTrigger> {
        let now = Instant::now();
        if now.duration_since(self.anchor) >= self.interval {
            self.anchor = now;
            self.counts.interval += 1;
            Some(SaveTrigger::Interval)
        } else {
            None
        }
    }

    /// Record a discrete save. Discrete saves are unconditional.
    pub fn on_discrete(&mut self, trigger: SaveTrigger) -> SaveTrigger {
        debug_assert!(trigger.is_discrete());
        self.counts.discrete += 1;
        trigger
    }

    /// `persisted` is false when the backend declined the write.
    pub fn record_saved(&mut self, persisted: bool) {
        if persisted {
            self.counts.persisted += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.counts.failed += 1;
    }

    pub fn counts(&self) -> SaveCounts {
        self.counts
    }
}
