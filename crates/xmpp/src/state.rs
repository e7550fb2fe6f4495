use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    NotAuthorized,
    Authorized,
    LoggedIn,
    Ready,
    LoggingOut,
    Resuming,
    Error,
}

impl SessionState {
    /// States in which outbound stanzas go straight to the connection.
    pub fn accepts_outbound(&self) -> bool {
        matches!(
            self,
            SessionState::LoggedIn | SessionState::Ready | SessionState::LoggingOut
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::NotAuthorized => "not_authorized",
            SessionState::Authorized => "authorized",
            SessionState::LoggedIn => "logged_in",
            SessionState::Ready => "ready",
            SessionState::LoggingOut => "logging_out",
            SessionState::Resuming => "resuming",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
