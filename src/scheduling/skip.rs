use serde::{Deserialize, Serialize};

use crate::models::SkipConfig;

/// Playback positions closer than this to the start or to the intro boundary
/// never trigger an intro skip.
pub const SKIP_DEAD_ZONE: f64 = 0.5;

/// Outro skips stop firing within this many seconds of the end, so the
/// natural `Ended` signal handles the last moment.
pub const OUTRO_TAIL: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SkipDecision {
    None,
    SkipIntroTo { seconds: f64 },
    SkipOutroAdvanceEpisode,
}

impl SkipDecision {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Map intro/outro boundaries and the current position to a skip decision.
///
/// `outro_seconds` is a negative offset from the end; zero or positive means
/// no outro rule.
pub fn compute_skip_action(
    intro_seconds: f64,
    outro_seconds: f64,
    current_seconds: f64,
    total_seconds: f64,
) -> SkipDecision {
    if total_seconds <= 0.0 {
        return SkipDecision::None;
    }

    if intro_seconds > 0.0
        && current_seconds > SKIP_DEAD_ZONE
        && current_seconds < intro_seconds - SKIP_DEAD_ZONE
    {
        return SkipDecision::SkipIntroTo {
            seconds: intro_seconds,
        };
    }

    if outro_seconds < 0.0
        && current_seconds >= total_seconds + outro_seconds
        && current_seconds < total_seconds - OUTRO_TAIL
    {
        return SkipDecision::SkipOutroAdvanceEpisode;
    }

    SkipDecision::None
}

/// Whether a skip check is worth issuing at all for this rule and duration.
pub fn should_check(config: &SkipConfig, total_seconds: f64) -> bool {
    config.enabled && total_seconds > 0.0 && (config.has_intro() || config.has_outro())
}
