use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use minidom::Element;
use tracing::{debug, trace};

pub type ResponseCallback = Box<dyn FnOnce(Element) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct PendingRequest {
    category: String,
    callback: ResponseCallback,
    registered_at: Instant,
}

/// Correlates IQ responses with the callbacks registered for their requests.
/// Identifiers come from a per-registry sequence, so they never repeat while
/// the registry lives.
#[derive(Default)]
pub struct PendingRequestRegistry {
    pending: HashMap<RequestId, PendingRequest>,
    sequence: u64,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: &str, callback: ResponseCallback) -> RequestId {
        self.sequence += 1;
        let id = RequestId(format!("{category}_{}", self.sequence));
        self.pending.insert(
            id.clone(),
            PendingRequest {
                category: category.to_string(),
                callback,
                registered_at: Instant::now(),
            },
        );
        trace!(id = %id, "request registered");
        id
    }

    /// Hands `response` to the callback registered under its `id` attribute.
    /// Returns false, without side effects, when nothing matches.
    pub fn resolve(&mut self, response: Element) -> bool {
        let Some(id) = response.attr("id") else {
            debug!("response without id ignored");
            return false;
        };

        let Some(request) = self.pending.remove(&RequestId(id.to_string())) else {
            debug!(id, "response for unknown request ignored");
            return false;
        };

        debug!(id, category = %request.category, "response correlated");
        (request.callback)(response);
        true
    }

    pub fn cancel(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Drops requests older than `max_age` without invoking their callbacks.
    pub fn prune_expired(&mut self, max_age: Duration) -> usize {
        self.prune_older_than(Instant::now(), max_age)
    }

    fn prune_older_than(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, request| now.saturating_duration_since(request.registered_at) < max_age);
        before - self.pending.len()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
