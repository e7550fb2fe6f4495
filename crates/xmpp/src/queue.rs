use std::collections::VecDeque;

use minidom::Element;

use crate::error::SessionError;

/// Stanzas waiting for the session to become able to send. FIFO; unbounded
/// unless a capacity is configured.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    stanzas: VecDeque<Element>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            stanzas: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, stanza: Element) -> Result<(), SessionError> {
        if let Some(capacity) = self.capacity {
            if self.stanzas.len() >= capacity {
                return Err(SessionError::QueueFull { capacity });
            }
        }
        self.stanzas.push_back(stanza);
        Ok(())
    }

    /// Takes every queued stanza in insertion order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Element> {
        std::mem::take(&mut self.stanzas).into()
    }

    pub fn len(&self) -> usize {
        self.stanzas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }
}
