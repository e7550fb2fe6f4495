use plover_core::PloverError;
use thiserror::Error;

use crate::state::SessionState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid login argument: {0}")]
    InvalidLoginArgument(String),

    #[error("cannot log in while session is {0}")]
    LoginInProgress(SessionState),

    #[error("outbound queue is full ({capacity} stanzas)")]
    QueueFull { capacity: usize },

    #[error("session driver stopped")]
    DriverStopped,

    #[error("request {0} was abandoned before a response arrived")]
    RequestAbandoned(String),
}

impl From<SessionError> for PloverError {
    fn from(error: SessionError) -> Self {
        PloverError::Session(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame parse failed: {0}")]
    ParseFailed(String),

    #[error("stanza serialization failed: {0}")]
    SerializeFailed(String),
}
