//! # Speechpipe Common Library
//!
//! Shared code for the speechpipe crates including:
//! - Run states and element identities
//! - Status event types (StatusEvent, Command, Payload)
//! - Audio format description
//! - Configuration file discovery and loading

pub mod config;
pub mod error;
pub mod events;
pub mod format;

pub use error::{Error, Result};
pub use events::{Command, ElementId, ElementState, Payload, SourceKind, StatusEvent};
pub use format::AudioFormat;
