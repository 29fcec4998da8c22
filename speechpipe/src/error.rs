//! Error types for speechpipe
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Graph-build failures are returned synchronously to whoever builds the
//! pipeline. Faults inside a running element never travel this way: they
//! become an `Error` state transition plus a status event (see
//! [`ElementFault`]).

use speechpipe_common::ElementState;
use std::fmt;
use thiserror::Error;

use crate::output::HardwareError;

/// Port direction, used to describe which side of an element is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Main error type for the speechpipe engine
#[derive(Error, Debug)]
pub enum Error {
    /// An element with this name is already registered
    #[error("Duplicate element name: {0}")]
    DuplicateName(String),

    /// A name in a link sequence (or lookup) is not registered
    #[error("Unknown element: {0}")]
    UnknownElement(String),

    /// An element in a link sequence lacks a port the link needs, or would
    /// leave a port unconnected
    #[error("Dangling port: element '{element}' {direction} port")]
    DanglingPort {
        element: String,
        direction: PortDirection,
    },

    /// `run()` called before any link
    #[error("Pipeline is not linked")]
    NotLinked,

    /// Invalid element or pipeline configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not allowed in the current run state
    #[error("Invalid state for {operation}: pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: ElementState,
    },

    /// Registered element is not of the requested type
    #[error("Element '{0}' has a different type")]
    ElementType(String),

    /// Hardware output surface fault
    #[error("Stream fault: {0}")]
    Stream(#[from] HardwareError),

    /// Event bus receive fault
    #[error("Channel fault: {0}")]
    Channel(#[from] ChannelFault),

    /// Worker thread could not be spawned or panicked
    #[error("Worker error: {0}")]
    Worker(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared configuration errors
    #[error(transparent)]
    Common(#[from] speechpipe_common::Error),
}

impl Error {
    /// Graph-build errors: reported before `run()` is ever invoked
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateName(_)
                | Error::UnknownElement(_)
                | Error::DanglingPort { .. }
                | Error::NotLinked
                | Error::InvalidConfig(_)
        )
    }
}

/// Convenience Result type using speechpipe Error
pub type Result<T> = std::result::Result<T, Error>;

/// Event bus receive fault
///
/// Never fatal on its own: the listener loop logs it and keeps waiting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelFault {
    /// Every producer handle is gone
    #[error("event channel disconnected")]
    Disconnected,

    /// Receive failed for a source-specific reason
    #[error("event receive failed: {0}")]
    Receive(String),
}

/// Fault raised inside a running element
#[derive(Error, Debug)]
pub enum ElementFault {
    /// Hardware output surface reported a fault (not retried)
    #[error("stream fault: {0}")]
    Stream(#[from] HardwareError),

    /// A port was aborted underneath the element (stop or neighbor failure)
    #[error("port aborted")]
    Interrupted,

    /// Sample-rate conversion failed
    #[error("resampler: {0}")]
    Resample(String),

    /// Element code panicked; the worker caught it
    #[error("element panicked: {0}")]
    Panicked(String),

    /// Element was started without a port its kind requires
    #[error("missing {0} port")]
    MissingPort(PortDirection),
}
