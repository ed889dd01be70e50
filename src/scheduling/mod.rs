//! Time-driven side effects evaluated on the engine's time-progress signal.

pub mod preload;
pub mod progress;
pub mod skip;
pub mod throttle;

pub use preload::{PreloadDecision, PreloadQuery, PreloadTracker};
pub use progress::{ProgressScheduler, SaveCounts, SaveTrigger};
pub use skip::{SkipDecision, compute_skip_action};
pub use throttle::Throttle;
