//! Async front for [`SessionEngine`]. One task owns the engine; API calls
//! arrive as [`SessionCommand`]s with a oneshot reply, collaborator results
//! arrive as [`SessionEvent`]s, and both are applied strictly one at a time.

use std::future;
use std::time::Duration;

use jid::Jid;
use minidom::Element;
use plover_core::config::SessionConfig;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::collaborators::{AttemptId, AuthAttempt, ResumptionToken};
use crate::engine::{Delivery, SessionEngine};
use crate::error::SessionError;
use crate::event::{AuthOutcome, SessionEvent};
use crate::observers::SessionNotification;
use crate::registry::RequestId;
use crate::state::SessionState;

const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub command_buffer: usize,
    pub prune_after: Option<Duration>,
    pub notification_capacity: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for DriverOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            command_buffer: config.command_buffer.max(1),
            prune_after: config.request_timeout_seconds.map(Duration::from_secs),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub current_user: Option<Jid>,
    pub queued: usize,
    pub pending_requests: usize,
}

#[derive(Debug)]
pub enum SessionCommand {
    Login {
        account: Account,
        password: Option<String>,
        reply_tx: oneshot::Sender<Result<(), SessionError>>,
    },
    Logout {
        reply_tx: oneshot::Sender<bool>,
    },
    SetReady {
        reply_tx: oneshot::Sender<bool>,
    },
    Pause {
        reply_tx: oneshot::Sender<Option<ResumptionToken>>,
    },
    Resume {
        user: Jid,
        token: ResumptionToken,
        reply_tx: oneshot::Sender<()>,
    },
    Send {
        stanza: Element,
        reply_tx: oneshot::Sender<Result<Delivery, SessionError>>,
    },
    SendRequest {
        category: String,
        request: Element,
        reply_tx: oneshot::Sender<Result<PendingResponse, SessionError>>,
    },
    Snapshot {
        reply_tx: oneshot::Sender<SessionSnapshot>,
    },
}

/// Cloned into collaborators so their asynchronous results re-enter the
/// session through the driver task.
#[derive(Debug, Clone)]
pub struct SessionEventSender {
    events: mpsc::UnboundedSender<SessionEvent>,
}

pub struct SessionEventReceiver {
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

pub fn event_channel() -> (SessionEventSender, SessionEventReceiver) {
    let (events, receiver) = mpsc::unbounded_channel();
    (
        SessionEventSender { events },
        SessionEventReceiver { events: receiver },
    )
}

impl SessionEventSender {
    pub fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events
            .send(event)
            .map_err(|_| SessionError::DriverStopped)
    }

    pub fn stanza_received(&self, stanza: Element) -> Result<(), SessionError> {
        self.send(SessionEvent::StanzaReceived(stanza))
    }

    pub fn transport_error(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionEvent::TransportError(reason.into()))
    }

    pub fn auth_result(&self, attempt: &AuthAttempt, succeeded: bool) -> Result<(), SessionError> {
        self.send(SessionEvent::AuthResult(AuthOutcome::new(attempt, succeeded)))
    }

    pub fn resource_bound(&self, attempt: AttemptId, address: Jid) -> Result<(), SessionError> {
        self.send(SessionEvent::resource_bound(attempt, address))
    }

    pub fn session_established(
        &self,
        attempt: AttemptId,
        address: Jid,
    ) -> Result<(), SessionError> {
        self.send(SessionEvent::session_established(attempt, address))
    }
}

/// Response side of [`SessionHandle::send_request`].
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    response: oneshot::Receiver<Element>,
}

impl PendingResponse {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Fails with [`SessionError::RequestAbandoned`] when the registration was
    /// dropped (logout, forced disconnect or expiry).
    pub async fn response(self) -> Result<Element, SessionError> {
        let id = self.id;
        self.response
            .await
            .map_err(|_| SessionError::RequestAbandoned(id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    notifications: broadcast::Sender<SessionNotification>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifications.subscribe()
    }

    pub async fn login(
        &self,
        account: Account,
        password: Option<String>,
    ) -> Result<(), SessionError> {
        self.request(|reply_tx| SessionCommand::Login {
            account,
            password,
            reply_tx,
        })
        .await?
    }

    pub async fn logout(&self) -> Result<bool, SessionError> {
        self.request(|reply_tx| SessionCommand::Logout { reply_tx })
            .await
    }

    pub async fn set_ready(&self) -> Result<bool, SessionError> {
        self.request(|reply_tx| SessionCommand::SetReady { reply_tx })
            .await
    }

    pub async fn pause(&self) -> Result<Option<ResumptionToken>, SessionError> {
        self.request(|reply_tx| SessionCommand::Pause { reply_tx })
            .await
    }

    pub async fn resume(&self, user: Jid, token: ResumptionToken) -> Result<(), SessionError> {
        self.request(|reply_tx| SessionCommand::Resume {
            user,
            token,
            reply_tx,
        })
        .await
    }

    pub async fn send(&self, stanza: Element) -> Result<Delivery, SessionError> {
        self.request(|reply_tx| SessionCommand::Send { stanza, reply_tx })
            .await?
    }

    pub async fn send_request(
        &self,
        category: impl Into<String>,
        request: Element,
    ) -> Result<PendingResponse, SessionError> {
        let category = category.into();
        self.request(|reply_tx| SessionCommand::SendRequest {
            category,
            request,
            reply_tx,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply_tx| SessionCommand::Snapshot { reply_tx })
            .await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn current_user(&self) -> Result<Option<Jid>, SessionError> {
        Ok(self.snapshot().await?.current_user)
    }

    pub async fn is_logged_in(&self) -> Result<bool, SessionError> {
        Ok(self.current_user().await?.is_some())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| SessionError::DriverStopped)?;
        reply_rx.await.map_err(|_| SessionError::DriverStopped)
    }
}

pub struct SessionDriver {
    engine: SessionEngine,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    prune_after: Option<Duration>,
}

impl SessionDriver {
    pub fn new(
        mut engine: SessionEngine,
        events: SessionEventReceiver,
        options: DriverOptions,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(options.command_buffer.max(1));
        let notifications = engine
            .observers_mut()
            .broadcast(options.notification_capacity);

        let driver = Self {
            engine,
            commands,
            events: events.events,
            prune_after: options.prune_after,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            notifications,
        };
        (driver, handle)
    }

    /// Runs until every [`SessionHandle`] is dropped. Pending collaborator
    /// events are always applied before the next command.
    pub async fn run(mut self) -> SessionEngine {
        let mut pruning = self.prune_after.map(|max_age| {
            let mut interval = time::interval(max_age);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (max_age, interval)
        });

        info!(prune_after = ?self.prune_after, "session driver started");
        loop {
            tokio::select! {
                biased;

                Some(event) = self.events.recv() => {
                    if let Err(error) = self.engine.handle(event) {
                        warn!(%error, "session event rejected");
                    }
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("all session handles dropped, driver exiting");
                        break;
                    };
                    self.dispatch(command);
                }

                max_age = next_prune(&mut pruning) => {
                    self.engine.prune_expired_requests(max_age);
                }
            }
        }

        self.engine
    }

    fn dispatch(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Login {
                account,
                password,
                reply_tx,
            } => {
                let _ = reply_tx.send(self.engine.login(account, password));
            }
            SessionCommand::Logout { reply_tx } => {
                let _ = reply_tx.send(self.engine.logout());
            }
            SessionCommand::SetReady { reply_tx } => {
                let _ = reply_tx.send(self.engine.set_ready());
            }
            SessionCommand::Pause { reply_tx } => {
                let _ = reply_tx.send(self.engine.pause());
            }
            SessionCommand::Resume {
                user,
                token,
                reply_tx,
            } => {
                self.engine.resume(user, token);
                let _ = reply_tx.send(());
            }
            SessionCommand::Send { stanza, reply_tx } => {
                let _ = reply_tx.send(self.engine.send(stanza));
            }
            SessionCommand::SendRequest {
                category,
                request,
                reply_tx,
            } => {
                let (response_tx, response) = oneshot::channel();
                let sent = self
                    .engine
                    .send_request(&category, request, move |element| {
                        let _ = response_tx.send(element);
                    })
                    .map(|id| PendingResponse { id, response });
                if let Err(error) = &sent {
                    debug!(%category, %error, "request not sent");
                }
                let _ = reply_tx.send(sent);
            }
            SessionCommand::Snapshot { reply_tx } => {
                let _ = reply_tx.send(SessionSnapshot {
                    state: self.engine.state(),
                    current_user: self.engine.current_user().cloned(),
                    queued: self.engine.queued_len(),
                    pending_requests: self.engine.pending_requests(),
                });
            }
        }
    }
}

async fn next_prune(pruning: &mut Option<(Duration, Interval)>) -> Duration {
    match pruning {
        Some((max_age, interval)) => {
            interval.tick().await;
            *max_age
        }
        None => future::pending().await,
    }
}
