//! Status event types shared by the pipeline and its listeners
//!
//! Every element posts a [`StatusEvent`] when its run state changes. Events are
//! ephemeral: produced once, consumed once by the listener, never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::format::AudioFormat;

/// Run state of an element (and of the pipeline as a whole)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementState {
    /// Created, not yet started
    Idle,
    /// Processing activity is running
    Running,
    /// Processing suspended, resumable
    Paused,
    /// Finished or stopped; no further processing this run
    Stopped,
    /// Faulted; no further processing this run
    Error,
}

impl ElementState {
    /// Whether the state ends the current run
    pub fn is_terminal(self) -> bool {
        matches!(self, ElementState::Stopped | ElementState::Error)
    }

    /// Whether the state counts as an active run (running or paused)
    pub fn is_active(self) -> bool {
        matches!(self, ElementState::Running | ElementState::Paused)
    }
}

impl Default for ElementState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementState::Idle => write!(f, "idle"),
            ElementState::Running => write!(f, "running"),
            ElementState::Paused => write!(f, "paused"),
            ElementState::Stopped => write!(f, "stopped"),
            ElementState::Error => write!(f, "error"),
        }
    }
}

/// Identity of an element, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of entity posted an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A pipeline element
    Element,
    /// Anything else posting onto the bus (application code, tests)
    Generic,
}

/// Event command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Run-state change; payload is [`Payload::Status`]
    ReportStatus,
    /// Stream format in effect; payload is [`Payload::StreamInfo`]
    ReportStreamInfo,
}

/// Event payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Status { state: ElementState },
    StreamInfo { format: AudioFormat },
}

/// Asynchronous notification posted onto the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Identity of the posting entity
    pub source: ElementId,
    /// Registered name of the posting entity (for diagnostics only)
    pub source_name: String,
    pub source_kind: SourceKind,
    pub command: Command,
    pub payload: Payload,
}

impl StatusEvent {
    /// Status report from an element
    pub fn status(source: ElementId, source_name: impl Into<String>, state: ElementState) -> Self {
        Self {
            source,
            source_name: source_name.into(),
            source_kind: SourceKind::Element,
            command: Command::ReportStatus,
            payload: Payload::Status { state },
        }
    }

    /// Stream format report from an element
    pub fn stream_info(source: ElementId, source_name: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            source,
            source_name: source_name.into(),
            source_kind: SourceKind::Element,
            command: Command::ReportStreamInfo,
            payload: Payload::StreamInfo { format },
        }
    }

    /// State carried by a status report, if this is one
    pub fn reported_state(&self) -> Option<ElementState> {
        match (self.command, self.payload) {
            (Command::ReportStatus, Payload::Status { state }) => Some(state),
            _ => None,
        }
    }

    /// True when `source` (an element) reports `state`
    pub fn is_status_from(&self, source: ElementId, state: ElementState) -> bool {
        self.source_kind == SourceKind::Element
            && self.source == source
            && self.reported_state() == Some(state)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload {
            Payload::Status { state } => write!(f, "[{}] status: {}", self.source_name, state),
            Payload::StreamInfo { format } => write!(f, "[{}] stream info: {}", self.source_name, format),
        }
    }
}
