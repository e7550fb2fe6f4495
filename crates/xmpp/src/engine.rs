use std::sync::Arc;
use std::time::Duration;

use jid::Jid;
use minidom::Element;
use plover_core::config::SessionConfig;
use tracing::{debug, error, info, trace, warn};

use crate::account::{Account, ResourceGenerator};
use crate::collaborators::{
    AttemptId, AuthAttempt, AuthenticationCoordinator, Connection, ImSessionEstablisher, ResourceBinder,
    ResumptionToken,
};
use crate::error::SessionError;
use crate::event::{AuthOutcome, EventOutcome, SessionEvent};
use crate::observers::SessionObservers;
use crate::queue::OutboundQueue;
use crate::registry::{PendingRequestRegistry, RequestId};
use crate::routing::{Route, classify};
use crate::state::SessionState;

#[derive(Clone)]
pub struct Collaborators {
    pub connection: Arc<dyn Connection>,
    pub authenticator: Arc<dyn AuthenticationCoordinator>,
    pub binder: Arc<dyn ResourceBinder>,
    pub im_session: Arc<dyn ImSessionEstablisher>,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub resource_prefix: String,
    pub max_queued_stanzas: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for EngineOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            resource_prefix: config.resource_prefix.clone(),
            max_queued_stanzas: config.max_queued_stanzas,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// The attempt whose authorization request went out. Kept until the session
/// is established so every later result can be matched against it.
#[derive(Debug, Clone)]
struct Handshake {
    attempt: AttemptId,
    account: Account,
}

impl Handshake {
    fn answers(&self, attempt: AttemptId, address: &Jid) -> bool {
        self.attempt == attempt && self.account.owns(address)
    }
}

/// The session state machine. Every mutation goes through [`Self::handle`]
/// or the outbound `send` path, both of which take `&mut self`; callers that
/// share an engine across tasks must funnel access through one owner (see
/// [`crate::driver`]).
pub struct SessionEngine {
    state: SessionState,
    current_user: Option<Jid>,
    pending_attempt: Option<AuthAttempt>,
    handshake: Option<Handshake>,
    last_attempt: AttemptId,
    queue: OutboundQueue,
    requests: PendingRequestRegistry,
    observers: SessionObservers,
    resources: ResourceGenerator,
    collaborators: Collaborators,
}

impl SessionEngine {
    pub fn new(collaborators: Collaborators, options: EngineOptions) -> Self {
        Self {
            state: SessionState::Disconnected,
            current_user: None,
            pending_attempt: None,
            handshake: None,
            last_attempt: AttemptId::default(),
            queue: OutboundQueue::new(options.max_queued_stanzas),
            requests: PendingRequestRegistry::new(),
            observers: SessionObservers::new(),
            resources: ResourceGenerator::new(options.resource_prefix),
            collaborators,
        }
    }

    pub fn observers_mut(&mut self) -> &mut SessionObservers {
        &mut self.observers
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_user(&self) -> Option<&Jid> {
        self.current_user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn is_authorizing(&self) -> bool {
        self.pending_attempt.is_some()
            || (self.state == SessionState::Connecting && self.handshake.is_some())
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn login(&mut self, account: Account, password: Option<String>) -> Result<(), SessionError> {
        self.handle(SessionEvent::login(account, password)).map(|_| ())
    }

    pub fn logout(&mut self) -> bool {
        self.apply(SessionEvent::Logout)
    }

    pub fn set_ready(&mut self) -> bool {
        self.apply(SessionEvent::SetReady)
    }

    pub fn pause(&mut self) -> Option<ResumptionToken> {
        match self.handle(SessionEvent::Pause) {
            Ok(EventOutcome::Paused(token)) => token,
            _ => None,
        }
    }

    pub fn resume(&mut self, user: Jid, token: ResumptionToken) {
        self.apply(SessionEvent::Resume { user, token });
    }

    /// Single entry point of the state machine. Only `Login` can fail; every
    /// protocol-level problem surfaces as a state transition instead.
    pub fn handle(&mut self, event: SessionEvent) -> Result<EventOutcome, SessionError> {
        trace!(event = event.kind(), state = %self.state, "handling session event");

        let outcome = match event {
            SessionEvent::Login(attempt) => self.begin_login(attempt)?,
            SessionEvent::Logout => self.finish_logout(),
            SessionEvent::SetReady => self.mark_ready(),
            SessionEvent::Pause => {
                debug!(state = %self.state, "pausing session stream");
                EventOutcome::Paused(self.collaborators.connection.pause())
            }
            SessionEvent::Resume { user, token } => self.resume_stream(user, token),
            SessionEvent::StanzaReceived(stanza) => self.route(stanza),
            SessionEvent::TransportError(reason) => self.on_transport_error(&reason),
            SessionEvent::AuthResult(outcome) => self.on_auth_result(outcome),
            SessionEvent::BindResult { attempt, address } => {
                self.on_resource_bound(attempt, address)
            }
            SessionEvent::SessionResult { attempt, address } => {
                self.on_session_established(attempt, address)
            }
        };

        Ok(outcome)
    }

    pub fn send(&mut self, stanza: Element) -> Result<Delivery, SessionError> {
        if self.state.accepts_outbound() {
            self.dispatch(stanza);
            return Ok(Delivery::Sent);
        }

        self.queue.push(stanza)?;
        debug!(
            state = %self.state,
            queued = self.queue.len(),
            "session cannot send yet, stanza queued"
        );
        Ok(Delivery::Queued)
    }

    /// Sends `request` with a freshly registered id. `callback` runs at most
    /// once, when a response carrying that id arrives.
    pub fn send_request(
        &mut self,
        category: &str,
        mut request: Element,
        callback: impl FnOnce(Element) + Send + 'static,
    ) -> Result<RequestId, SessionError> {
        let id = self.requests.register(category, Box::new(callback));
        request.set_attr("id", id.as_str());

        if let Err(error) = self.send(request) {
            self.requests.cancel(&id);
            return Err(error);
        }
        Ok(id)
    }

    pub fn prune_expired_requests(&mut self, max_age: Duration) -> usize {
        let pruned = self.requests.prune_expired(max_age);
        if pruned > 0 {
            warn!(pruned, ?max_age, "dropped unanswered requests");
        }
        pruned
    }

    fn apply(&mut self, event: SessionEvent) -> bool {
        matches!(self.handle(event), Ok(EventOutcome::Applied))
    }

    fn begin_login(&mut self, attempt: AuthAttempt) -> Result<EventOutcome, SessionError> {
        if attempt.account.is_anonymous() && attempt.password.is_some() {
            return Err(SessionError::InvalidLoginArgument(
                "anonymous login can't have password".to_string(),
            ));
        }
        if self.state != SessionState::Disconnected {
            return Err(SessionError::LoginInProgress(self.state));
        }

        let account = self.resources.assign(attempt.account)?;
        self.last_attempt = self.last_attempt.next();
        info!(account = %account, attempt = %self.last_attempt, "starting login");

        self.pending_attempt = Some(AuthAttempt {
            id: self.last_attempt,
            account,
            password: attempt.password,
        });
        self.set_state(SessionState::Connecting);
        self.collaborators.connection.connect();
        Ok(EventOutcome::Applied)
    }

    fn route(&mut self, stanza: Element) -> EventOutcome {
        match classify(&stanza) {
            Route::Message => self.observers.message(&stanza),
            Route::Presence => self.observers.presence(&stanza),
            Route::IncomingRequest => self.observers.request(&stanza),
            Route::Response => {
                if !self.requests.resolve(stanza) {
                    return EventOutcome::Ignored;
                }
            }
            Route::MechanismsOffered => return self.on_mechanisms_offered(),
            Route::Ignored => {
                trace!(name = stanza.name(), "unroutable stanza ignored");
                return EventOutcome::Ignored;
            }
        }
        EventOutcome::Applied
    }

    fn on_mechanisms_offered(&mut self) -> EventOutcome {
        let Some(attempt) = self.pending_attempt.take() else {
            debug!("mechanisms offered with no pending login, ignoring");
            return EventOutcome::Ignored;
        };

        debug!(
            account = %attempt.account,
            attempt = %attempt.id,
            "sending authorization request"
        );
        self.handshake = Some(Handshake {
            attempt: attempt.id,
            account: attempt.account.clone(),
        });
        self.collaborators
            .authenticator
            .send_authorization_request(attempt);
        EventOutcome::Applied
    }

    fn on_auth_result(&mut self, outcome: AuthOutcome) -> EventOutcome {
        let expected = self.state == SessionState::Connecting
            && self.handshake.as_ref().is_some_and(|handshake| {
                handshake.attempt == outcome.attempt && handshake.account == outcome.account
            });
        if !expected {
            warn!(
                account = %outcome.account,
                attempt = %outcome.attempt,
                state = %self.state,
                "stale authorization result ignored"
            );
            return EventOutcome::Ignored;
        }

        if outcome.succeeded {
            info!(account = %outcome.account, attempt = %outcome.attempt, "authorized");
            self.set_state(SessionState::Authorized);
            self.collaborators.connection.restart_stream();
            self.collaborators
                .binder
                .bind_resource(outcome.attempt, outcome.account.resource());
        } else {
            warn!(account = %outcome.account, "authorization rejected");
            self.set_state(SessionState::NotAuthorized);
            self.force_disconnect();
        }
        EventOutcome::Applied
    }

    fn on_resource_bound(&mut self, attempt: AttemptId, address: Jid) -> EventOutcome {
        if !self.expects_result_for(attempt, &address) {
            warn!(%address, %attempt, state = %self.state, "stale binding result ignored");
            return EventOutcome::Ignored;
        }

        debug!(%address, %attempt, "resource bound, requesting IM session");
        self.collaborators
            .im_session
            .request_session(attempt, address);
        EventOutcome::Applied
    }

    fn on_session_established(&mut self, attempt: AttemptId, address: Jid) -> EventOutcome {
        if !self.expects_result_for(attempt, &address) {
            warn!(%address, %attempt, state = %self.state, "stale session result ignored");
            return EventOutcome::Ignored;
        }

        info!(%address, %attempt, "logged in");
        self.handshake = None;
        self.current_user = Some(address);
        self.set_state(SessionState::LoggedIn);
        EventOutcome::Applied
    }

    fn expects_result_for(&self, attempt: AttemptId, address: &Jid) -> bool {
        self.state == SessionState::Authorized
            && self
                .handshake
                .as_ref()
                .is_some_and(|handshake| handshake.answers(attempt, address))
    }

    fn mark_ready(&mut self) -> EventOutcome {
        if self.current_user.is_none() {
            debug!(state = %self.state, "set_ready ignored");
            return EventOutcome::Ignored;
        }

        self.enter_ready();
        EventOutcome::Applied
    }

    fn finish_logout(&mut self) -> EventOutcome {
        if self.state == SessionState::Disconnected || self.current_user.is_none() {
            debug!(state = %self.state, "logout ignored");
            return EventOutcome::Ignored;
        }

        info!(state = %self.state, "logging out");
        self.set_state(SessionState::LoggingOut);
        self.clear_session();
        self.collaborators.connection.disconnect();
        self.set_state(SessionState::Disconnected);
        EventOutcome::Applied
    }

    fn resume_stream(&mut self, user: Jid, token: ResumptionToken) -> EventOutcome {
        info!(%user, state = %self.state, "resuming session");
        self.pending_attempt = None;
        self.handshake = None;
        self.current_user = Some(user);
        self.set_state(SessionState::Resuming);
        self.collaborators.connection.resume(token);
        self.enter_ready();
        EventOutcome::Applied
    }

    fn on_transport_error(&mut self, reason: &str) -> EventOutcome {
        error!(reason, state = %self.state, "connection error");
        self.clear_session();
        self.set_state(SessionState::Error);
        self.force_disconnect();
        EventOutcome::Applied
    }

    /// Queued stanzas reach the connection before anyone observes `Ready`.
    fn enter_ready(&mut self) {
        let queued = self.queue.drain();
        if !queued.is_empty() {
            info!(count = queued.len(), "flushing queued stanzas");
        }
        for stanza in queued {
            self.dispatch(stanza);
        }
        self.set_state(SessionState::Ready);
    }

    fn force_disconnect(&mut self) {
        self.clear_session();
        self.collaborators.connection.disconnect();
        self.set_state(SessionState::Disconnected);
    }

    fn clear_session(&mut self) {
        self.pending_attempt = None;
        self.handshake = None;
        self.current_user = None;

        let dropped = self.requests.clear();
        if dropped > 0 {
            debug!(dropped, "discarded pending requests");
        }
    }

    fn dispatch(&self, mut stanza: Element) {
        if let Some(user) = &self.current_user {
            stanza.set_attr("from", user.to_string());
        }
        self.collaborators.connection.send(stanza);
    }

    fn set_state(&mut self, next: SessionState) {
        let previous = std::mem::replace(&mut self.state, next);
        debug!(from = %previous, to = %next, "session state changed");
        self.observers.state_changed(next);
    }
}
