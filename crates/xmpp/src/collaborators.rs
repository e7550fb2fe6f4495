//! Boundaries the session engine drives outward. Every implementation reports
//! its results back through [`crate::event::SessionEvent`]s; none of these
//! calls may block.

use std::fmt;

use jid::Jid;
use minidom::Element;
use plover_core::config::AccountConfig;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::SessionError;

/// Per-engine login counter. Every result a collaborator reports carries the
/// id of the attempt it belongs to; results for any other id are stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One in-flight authentication handshake. The engine assigns `id` when the
/// login is accepted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    pub id: AttemptId,
    pub account: Account,
    pub password: Option<String>,
}

impl AuthAttempt {
    pub fn new(account: Account, password: Option<String>) -> Self {
        Self {
            id: AttemptId::default(),
            account,
            password,
        }
    }
}

impl TryFrom<&AccountConfig> for AuthAttempt {
    type Error = SessionError;

    fn try_from(config: &AccountConfig) -> Result<Self, Self::Error> {
        let account = match &config.anonymous_domain {
            Some(domain) => Account::anonymous(domain.clone()),
            None => config.jid.parse()?,
        };
        Ok(Self::new(account, config.password.clone()))
    }
}

impl fmt::Debug for AuthAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthAttempt")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Opaque stream state handed out by [`Connection::pause`]; only the
/// connection knows its layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionToken(Vec<u8>);

impl ResumptionToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Connection: Send + Sync + 'static {
    fn connect(&self);

    fn disconnect(&self);

    fn send(&self, stanza: Element);

    fn restart_stream(&self);

    fn pause(&self) -> Option<ResumptionToken>;

    fn resume(&self, token: ResumptionToken);
}

#[cfg_attr(test, mockall::automock)]
pub trait AuthenticationCoordinator: Send + Sync + 'static {
    fn send_authorization_request(&self, attempt: AuthAttempt);
}

#[cfg_attr(test, mockall::automock)]
pub trait ResourceBinder: Send + Sync + 'static {
    /// `None` asks the server to pick a resource (anonymous logins).
    fn bind_resource(&self, attempt: AttemptId, resource: Option<String>);
}

#[cfg_attr(test, mockall::automock)]
pub trait ImSessionEstablisher: Send + Sync + 'static {
    fn request_session(&self, attempt: AttemptId, address: Jid);
}
