use thiserror::Error;

use crate::session::SessionPhase;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Missing parameters: a source and id or a title is required")]
    MissingParameters,

    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("No matching result for: {0}")]
    NotFound(String),

    #[error("Invalid transition from {from:?}: {operation}")]
    InvalidTransition {
        from: SessionPhase,
        operation: &'static str,
    },

    #[error("Session is halted in error state: {0}")]
    Halted(String),

    #[error("No resolved detail for the current session")]
    NoDetail,

    #[error("Playback engine error: {0}")]
    Engine(String),

    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Session has been torn down")]
    Disposed,
}

impl SessionError {
    /// Message shown to the user when this error halts the session.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingParameters => "Missing required parameters".to_string(),
            Self::NotFound(_) => "No matching result found".to_string(),
            Self::Resolution(msg) | Self::Engine(msg) => msg.clone(),
            Self::Backend(e) => {
                let es = e.to_string().to_lowercase();
                if es.contains("timed out") || es.contains("connection") {
                    "Cannot reach the backend. Check your connection.".to_string()
                } else {
                    "Failed to load playback data".to_string()
                }
            }
            other => other.to_string(),
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
