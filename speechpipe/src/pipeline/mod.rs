//! Streaming pipeline engine
//!
//! Elements connected through bounded byte ports, each element on its own
//! worker thread, all reporting state changes onto one event bus.

pub mod bus;
mod control;
pub mod element;
pub mod filter;
pub mod graph;
pub mod port;
pub mod sink;
pub mod source;
mod worker;

pub use bus::{EventBus, EventSender, EventSource, Listener, TerminationPolicy};
pub use element::{Capabilities, Element, ElementContext, ElementKind, PortIo, ProcessResult, Step, Upstream};
pub use filter::{FormatFilter, Plan, ResampleConfig};
pub use graph::{Pipeline, PipelineSettings};
pub use port::PortStats;
pub use sink::SinkWriter;
pub use source::SourceAdapter;
