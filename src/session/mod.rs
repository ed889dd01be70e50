pub mod guard;
pub mod phase;
pub mod store;

pub use guard::{GuardToken, RequestSnapshot, StaleGuard};
pub use phase::{PhaseMachine, PhaseTransition, SessionPhase};
pub use store::{Session, SessionPatch, SessionStore};
