use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use jid::Jid;

use crate::error::SessionError;

static RESOURCE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The identity a login is attempted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Account {
    Anonymous { domain: String },
    Named(Jid),
}

impl Account {
    pub fn anonymous(domain: impl Into<String>) -> Self {
        Account::Anonymous {
            domain: domain.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Account::Anonymous { .. })
    }

    pub fn has_resource(&self) -> bool {
        match self {
            Account::Anonymous { .. } => false,
            Account::Named(jid) => jid.resource().is_some(),
        }
    }

    pub fn resource(&self) -> Option<String> {
        match self {
            Account::Anonymous { .. } => None,
            Account::Named(jid) => jid.resource().map(|resource| resource.as_str().to_string()),
        }
    }

    pub fn domain(&self) -> String {
        match self {
            Account::Anonymous { domain } => domain.clone(),
            Account::Named(jid) => jid.domain().as_str().to_string(),
        }
    }

    /// Whether a bound `address` belongs to this account. Anonymous logins
    /// only pin the domain; named logins pin the bare JID.
    pub fn owns(&self, address: &Jid) -> bool {
        match self {
            Account::Anonymous { .. } => self.domain() == address.domain().as_str(),
            Account::Named(jid) => jid.to_bare() == address.to_bare(),
        }
    }

    fn with_resource(&self, resource: &str) -> Result<Account, SessionError> {
        let Account::Named(jid) = self else {
            return Ok(self.clone());
        };

        let full = format!("{}/{resource}", jid.to_bare());
        full.parse::<Jid>().map(Account::Named).map_err(|error| {
            SessionError::InvalidLoginArgument(format!("cannot assign resource to {jid}: {error}"))
        })
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Anonymous { domain } => write!(f, "anonymous@{domain}"),
            Account::Named(jid) => write!(f, "{jid}"),
        }
    }
}

impl From<Jid> for Account {
    fn from(jid: Jid) -> Self {
        Account::Named(jid)
    }
}

impl FromStr for Account {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Jid>()
            .map(Account::Named)
            .map_err(|error| SessionError::InvalidLoginArgument(format!("invalid JID '{s}': {error}")))
    }
}

/// Produces resources that stay unique within the process, even when two
/// logins land on the same millisecond.
#[derive(Debug, Clone)]
pub struct ResourceGenerator {
    prefix: String,
}

impl ResourceGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn next_resource(&self) -> String {
        let sequence = RESOURCE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        if self.prefix.is_empty() {
            format!("{millis}-{sequence}")
        } else {
            format!("{}-{millis}-{sequence}", self.prefix)
        }
    }

    /// Named accounts without a resource get a generated one; everything else
    /// passes through untouched.
    pub fn assign(&self, account: Account) -> Result<Account, SessionError> {
        if account.is_anonymous() || account.has_resource() {
            return Ok(account);
        }
        account.with_resource(&self.next_resource())
    }
}

impl Default for ResourceGenerator {
    fn default() -> Self {
        Self::new("plover")
    }
}
