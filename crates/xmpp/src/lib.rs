pub mod account;
pub mod collaborators;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod observers;
pub mod queue;
pub mod registry;
pub mod routing;
pub mod state;
pub mod wire;

pub use account::{Account, ResourceGenerator};
pub use collaborators::{
    AttemptId, AuthAttempt, AuthenticationCoordinator, Connection, ImSessionEstablisher,
    ResourceBinder, ResumptionToken,
};
pub use driver::{
    DriverOptions, PendingResponse, SessionCommand, SessionDriver, SessionEventReceiver,
    SessionEventSender, SessionHandle, SessionSnapshot, event_channel,
};
pub use engine::{Collaborators, Delivery, EngineOptions, SessionEngine};
pub use error::{SessionError, WireError};
pub use event::{AuthOutcome, EventOutcome, SessionEvent};
pub use observers::{SessionNotification, SessionObservers};
pub use queue::OutboundQueue;
pub use registry::{PendingRequestRegistry, RequestId, ResponseCallback};
pub use routing::{Route, STREAM_NS, classify};
pub use state::SessionState;
pub use wire::{ChannelConnection, WireCommand, decode_frame, encode_stanza};
