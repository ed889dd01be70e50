use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use crate::core::Property;
use crate::utils::{SessionError, SessionResult};

const MAX_TRANSITION_HISTORY: usize = 64;

/// Lifecycle phase of a playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not mounted yet, or torn down
    Idle,
    /// Initial identity/query resolution in flight
    Resolving,
    /// Session committed; the engine may be loading
    Ready,
    Playing,
    Paused,
    /// Source switch in flight
    Switching,
    /// Final episode (or an episode without successor yet) finished
    Ended,
    /// Resolution or source switch failed; mutation halted until retry
    Error(String),
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Switching => "switching",
            Self::Ended => "ended",
            Self::Error(_) => "error",
        }
    }

    /// A committed session exists and user controls may mutate it.
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Playing | Self::Paused | Self::Switching | Self::Ended
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct PhaseTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub timestamp: DateTime<Utc>,
    pub operation: &'static str,
}

/// Explicit state machine for the session lifecycle.
///
/// Every transition is a named method that checks the current phase, so an
/// illegal combination (for example a source switch while the initial
/// resolution is still running) is rejected instead of silently applied.
#[derive(Debug)]
pub struct PhaseMachine {
    phase: Property<SessionPhase>,
    transitions: Mutex<VecDeque<PhaseTransition>>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: Property::new(SessionPhase::Idle, "phase"),
            transitions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn current(&self) -> SessionPhase {
        self.phase.get()
    }

    pub fn property(&self) -> &Property<SessionPhase> {
        &self.phase
    }

    pub fn history(&self) -> Vec<PhaseTransition> {
        self.lock_transitions().iter().cloned().collect()
    }

    fn lock_transitions(&self) -> std::sync::MutexGuard<'_, VecDeque<PhaseTransition>> {
        self.transitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(
        &self,
        operation: &'static str,
        allowed: impl Fn(&SessionPhase) -> bool,
        to: SessionPhase,
    ) -> SessionResult<SessionPhase> {
        let from = self.phase.get();
        if !allowed(&from) {
            return Err(SessionError::InvalidTransition { from, operation });
        }
        if from == to {
            return Ok(from);
        }

        debug!("Session phase {} -> {} ({})", from.as_str(), to.as_str(), operation);
        self.phase.set(to.clone());

        let mut log = self.lock_transitions();
        log.push_back(PhaseTransition {
            from: from.clone(),
            to,
            timestamp: Utc::now(),
            operation,
        });
        while log.len() > MAX_TRANSITION_HISTORY {
            log.pop_front();
        }

        Ok(from)
    }

    /// Idle/Error -> Resolving
    pub fn begin_resolving(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "begin_resolving",
            |p| matches!(p, SessionPhase::Idle | SessionPhase::Error(_)),
            SessionPhase::Resolving,
        )
    }

    /// Resolving -> Ready
    pub fn resolved(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "resolved",
            |p| matches!(p, SessionPhase::Resolving),
            SessionPhase::Ready,
        )
    }

    /// Ready/Playing/Paused/Ended/Switching -> Switching
    ///
    /// Switching -> Switching is tolerated: a superseding switch simply makes
    /// the earlier one stale.
    pub fn begin_switch(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "begin_switch",
            SessionPhase::is_interactive,
            SessionPhase::Switching,
        )
    }

    /// Switching -> Ready, after the switch result was committed
    pub fn switched(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "switched",
            |p| matches!(p, SessionPhase::Switching),
            SessionPhase::Ready,
        )
    }

    /// Switching -> Ready, after the latest switch result was discarded as stale
    pub fn switch_abandoned(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "switch_abandoned",
            |p| matches!(p, SessionPhase::Switching),
            SessionPhase::Ready,
        )
    }

    /// Any interactive phase -> Ready, after the episode index changed
    pub fn episode_selected(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "episode_selected",
            SessionPhase::is_interactive,
            SessionPhase::Ready,
        )
    }

    /// Ready/Paused/Ended -> Playing
    pub fn played(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "played",
            |p| {
                matches!(
                    p,
                    SessionPhase::Ready
                        | SessionPhase::Paused
                        | SessionPhase::Ended
                        | SessionPhase::Playing
                )
            },
            SessionPhase::Playing,
        )
    }

    /// Playing/Ready -> Paused
    pub fn paused(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "paused",
            |p| matches!(p, SessionPhase::Playing | SessionPhase::Ready | SessionPhase::Paused),
            SessionPhase::Paused,
        )
    }

    /// Playing/Paused -> Ended
    pub fn ended(&self) -> SessionResult<SessionPhase> {
        self.transition(
            "ended",
            |p| matches!(p, SessionPhase::Playing | SessionPhase::Paused | SessionPhase::Ready),
            SessionPhase::Ended,
        )
    }

    /// Resolving/Switching/Ready/Playing/Paused -> Error
    pub fn fail(&self, message: impl Into<String>) -> SessionResult<SessionPhase> {
        self.transition(
            "fail",
            |p| {
                matches!(
                    p,
                    SessionPhase::Resolving
                        | SessionPhase::Switching
                        | SessionPhase::Ready
                        | SessionPhase::Playing
                        | SessionPhase::Paused
                )
            },
            SessionPhase::Error(message.into()),
        )
    }

    /// Any -> Idle, on teardown
    pub fn torn_down(&self) -> SessionResult<SessionPhase> {
        self.transition("torn_down", |_| true, SessionPhase::Idle)
    }
}
