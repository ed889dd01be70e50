//! Playback session controller for streaming video.
//!
//! A [`SessionController`] keeps one playback session consistent while
//! resolution, source switches, progress saves, skip and preload checks and
//! the wake lock all race against it.

pub mod backends;
pub mod config;
pub mod controller;
pub mod core;
pub mod events;
pub mod models;
pub mod player;
pub mod scheduling;
pub mod session;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use controller::{ControllerParts, SessionController};
pub use session::SessionPhase;
pub use utils::{SessionError, SessionResult};
