use minidom::Element;
use tokio::sync::broadcast;

use crate::state::SessionState;

pub type StateListener = Box<dyn Fn(SessionState) + Send + 'static>;
pub type StanzaListener = Box<dyn Fn(&Element) + Send + 'static>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    StateChanged(SessionState),
    Message(Element),
    Presence(Element),
    IncomingRequest(Element),
}

/// Listener registrations, one list per notification category. Listeners run
/// synchronously inside the event that triggered them, in registration order.
#[derive(Default)]
pub struct SessionObservers {
    state: Vec<StateListener>,
    message: Vec<StanzaListener>,
    presence: Vec<StanzaListener>,
    request: Vec<StanzaListener>,
}

impl SessionObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state_changed(&mut self, listener: impl Fn(SessionState) + Send + 'static) {
        self.state.push(Box::new(listener));
    }

    pub fn on_message(&mut self, listener: impl Fn(&Element) + Send + 'static) {
        self.message.push(Box::new(listener));
    }

    pub fn on_presence(&mut self, listener: impl Fn(&Element) + Send + 'static) {
        self.presence.push(Box::new(listener));
    }

    pub fn on_request(&mut self, listener: impl Fn(&Element) + Send + 'static) {
        self.request.push(Box::new(listener));
    }

    /// Mirrors every category into a broadcast channel. Call `subscribe()` on
    /// the returned sender for each async consumer.
    pub fn broadcast(&mut self, capacity: usize) -> broadcast::Sender<SessionNotification> {
        let (sender, _) = broadcast::channel(capacity.max(1));

        let tx = sender.clone();
        self.on_state_changed(move |state| {
            let _ = tx.send(SessionNotification::StateChanged(state));
        });
        let tx = sender.clone();
        self.on_message(move |stanza| {
            let _ = tx.send(SessionNotification::Message(stanza.clone()));
        });
        let tx = sender.clone();
        self.on_presence(move |stanza| {
            let _ = tx.send(SessionNotification::Presence(stanza.clone()));
        });
        let tx = sender.clone();
        self.on_request(move |stanza| {
            let _ = tx.send(SessionNotification::IncomingRequest(stanza.clone()));
        });

        sender
    }

    pub(crate) fn state_changed(&self, state: SessionState) {
        for listener in &self.state {
            listener(state);
        }
    }

    pub(crate) fn message(&self, stanza: &Element) {
        for listener in &self.message {
            listener(stanza);
        }
    }

    pub(crate) fn presence(&self, stanza: &Element) {
        for listener in &self.presence {
            listener(stanza);
        }
    }

    pub(crate) fn request(&self, stanza: &Element) {
        for listener in &self.request {
            listener(stanza);
        }
    }
}
