use jid::Jid;
use minidom::Element;

use crate::account::Account;
use crate::collaborators::{AttemptId, AuthAttempt, ResumptionToken};

/// Everything that can move the session state machine, whether it comes from
/// the application or from a collaborator reporting back.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Login(AuthAttempt),
    Logout,
    SetReady,
    Pause,
    Resume { user: Jid, token: ResumptionToken },
    StanzaReceived(Element),
    TransportError(String),
    AuthResult(AuthOutcome),
    BindResult { attempt: AttemptId, address: Jid },
    SessionResult { attempt: AttemptId, address: Jid },
}

impl SessionEvent {
    pub fn login(account: Account, password: Option<String>) -> Self {
        SessionEvent::Login(AuthAttempt::new(account, password))
    }

    pub fn auth_succeeded(attempt: &AuthAttempt) -> Self {
        SessionEvent::AuthResult(AuthOutcome::new(attempt, true))
    }

    pub fn auth_failed(attempt: &AuthAttempt) -> Self {
        SessionEvent::AuthResult(AuthOutcome::new(attempt, false))
    }

    pub fn resource_bound(attempt: AttemptId, address: Jid) -> Self {
        SessionEvent::BindResult { attempt, address }
    }

    pub fn session_established(attempt: AttemptId, address: Jid) -> Self {
        SessionEvent::SessionResult { attempt, address }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Login(_) => "login",
            SessionEvent::Logout => "logout",
            SessionEvent::SetReady => "set_ready",
            SessionEvent::Pause => "pause",
            SessionEvent::Resume { .. } => "resume",
            SessionEvent::StanzaReceived(_) => "stanza_received",
            SessionEvent::TransportError(_) => "transport_error",
            SessionEvent::AuthResult(_) => "auth_result",
            SessionEvent::BindResult { .. } => "bind_result",
            SessionEvent::SessionResult { .. } => "session_result",
        }
    }
}

/// Result of one authorization handshake, tagged with the attempt it answers
/// so stale reports can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub attempt: AttemptId,
    pub account: Account,
    pub succeeded: bool,
}

impl AuthOutcome {
    pub fn new(attempt: &AuthAttempt, succeeded: bool) -> Self {
        Self {
            attempt: attempt.id,
            account: attempt.account.clone(),
            succeeded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored,
    Paused(Option<ResumptionToken>),
}
