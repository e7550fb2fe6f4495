//! Channel-backed [`Connection`] so any transport task can sit behind the
//! session engine: outbound work is serialised into [`WireCommand`]s, inbound
//! bytes go through [`decode_frame`] and back in as
//! [`SessionEvent::StanzaReceived`](crate::event::SessionEvent).

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use minidom::Element;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::collaborators::{Connection, ResumptionToken};
use crate::error::WireError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCommand {
    Connect,
    Disconnect,
    Send(Vec<u8>),
    RestartStream,
    Resume(ResumptionToken),
}

pub struct ChannelConnection {
    commands: mpsc::UnboundedSender<WireCommand>,
    resumption: Mutex<Option<ResumptionToken>>,
}

impl ChannelConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WireCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            commands,
            resumption: Mutex::new(None),
        };
        (connection, receiver)
    }

    /// Called by the transport once the server has enabled stream resumption.
    pub fn set_resumption_token(&self, token: Option<ResumptionToken>) {
        *self
            .resumption
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn push(&self, command: WireCommand) {
        if self.commands.send(command).is_err() {
            warn!("wire transport is gone, dropping command");
        }
    }
}

impl Connection for ChannelConnection {
    fn connect(&self) {
        self.push(WireCommand::Connect);
    }

    fn disconnect(&self) {
        self.push(WireCommand::Disconnect);
    }

    fn send(&self, stanza: Element) {
        match encode_stanza(&stanza) {
            Ok(payload) => self.push(WireCommand::Send(payload)),
            Err(error) => warn!(%error, name = stanza.name(), "dropping unserializable stanza"),
        }
    }

    fn restart_stream(&self) {
        self.push(WireCommand::RestartStream);
    }

    fn pause(&self) -> Option<ResumptionToken> {
        let token = self
            .resumption
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(resumable = token.is_some(), "pausing wire stream");
        token
    }

    fn resume(&self, token: ResumptionToken) {
        self.push(WireCommand::Resume(token));
    }
}

pub fn encode_stanza(stanza: &Element) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    stanza.write_to(&mut payload).map_err(|error| {
        WireError::SerializeFailed(format!(
            "failed to serialize <{}/> stanza: {error}",
            stanza.name()
        ))
    })?;
    Ok(payload)
}

pub fn decode_frame(raw: &[u8]) -> Result<Element, WireError> {
    let xml = std::str::from_utf8(raw)
        .map_err(|error| WireError::ParseFailed(format!("invalid UTF-8 frame bytes: {error}")))?;
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Err(WireError::ParseFailed("frame payload is empty".to_string()));
    }

    Element::from_str(trimmed)
        .map_err(|error| WireError::ParseFailed(format!("failed to parse frame XML: {error}")))
}
