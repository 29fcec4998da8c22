//! # speechpipe
//!
//! Streaming pipeline engine for synthesized speech.
//!
//! **Purpose:** Pull 8-bit speech samples from a synthesizer buffer, convert
//! them to the output format, and drain them into a clocked hardware output,
//! with the whole graph started and stopped as one unit.
//!
//! **Architecture:** Source adapter → format filter → sink writer, one worker
//! thread per element, bounded ring-buffer ports between them, and a single
//! status event bus that a listener loop watches for the sink's completion.

pub mod audio;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod speech;

pub use error::{Error, Result};
pub use pipeline::{EventBus, Listener, Pipeline};
