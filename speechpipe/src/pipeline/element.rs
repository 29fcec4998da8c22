//! Element abstraction
//!
//! Every node of the graph implements [`Element`]. The graph only knows an
//! element through its capability set (which ports it has) and its `step`
//! function; the three concrete variants are [`SourceAdapter`],
//! [`FormatFilter`] and [`SinkWriter`].
//!
//! [`SourceAdapter`]: super::SourceAdapter
//! [`FormatFilter`]: super::FormatFilter
//! [`SinkWriter`]: super::SinkWriter

use speechpipe_common::{AudioFormat, ElementId, StatusEvent};
use std::any::Any;
use std::fmt;

use super::bus::EventSender;
use super::port::{PortReader, PortWriter};
use crate::error::{ElementFault, PortDirection};

/// Outcome of one processing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Produced this many units (0 ≤ n ≤ capacity); see the callee for the unit
    Produced(usize),
    /// No further data for the remainder of the run
    EndOfStream,
}

/// Anything a downstream element can pull bytes from
pub trait Upstream {
    /// Fill up to `buf.len()` bytes; `Produced(n)` counts bytes
    fn read(&mut self, buf: &mut [u8]) -> Result<ProcessResult, ElementFault>;
}

/// Element variant, which fixes the capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Output port only
    Source,
    /// Input and output ports
    Filter,
    /// Input port only
    Sink,
}

impl ElementKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            ElementKind::Source => Capabilities {
                has_input: false,
                has_output: true,
            },
            ElementKind::Filter => Capabilities {
                has_input: true,
                has_output: true,
            },
            ElementKind::Sink => Capabilities {
                has_input: true,
                has_output: false,
            },
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Source => write!(f, "source"),
            ElementKind::Filter => write!(f, "filter"),
            ElementKind::Sink => write!(f, "sink"),
        }
    }
}

/// Which ports an element exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub has_input: bool,
    pub has_output: bool,
}

impl Capabilities {
    pub fn has(&self, direction: PortDirection) -> bool {
        match direction {
            PortDirection::Input => self.has_input,
            PortDirection::Output => self.has_output,
        }
    }
}

/// Result of one `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work may follow
    Continue,
    /// Input exhausted and everything flushed downstream
    Finished,
}

/// Ports handed to an element for the duration of a run
#[derive(Default)]
pub struct PortIo {
    pub(crate) input: Option<PortReader>,
    pub(crate) output: Option<PortWriter>,
}

impl PortIo {
    pub fn new(input: Option<PortReader>, output: Option<PortWriter>) -> Self {
        Self { input, output }
    }

    pub fn input(&mut self) -> Result<&mut PortReader, ElementFault> {
        self.input
            .as_mut()
            .ok_or(ElementFault::MissingPort(PortDirection::Input))
    }

    pub fn output(&mut self) -> Result<&mut PortWriter, ElementFault> {
        self.output
            .as_mut()
            .ok_or(ElementFault::MissingPort(PortDirection::Output))
    }

    /// Both ports at once, for elements that move bytes through
    pub fn both(&mut self) -> Result<(&mut PortReader, &mut PortWriter), ElementFault> {
        match (self.input.as_mut(), self.output.as_mut()) {
            (Some(input), Some(output)) => Ok((input, output)),
            (None, _) => Err(ElementFault::MissingPort(PortDirection::Input)),
            (_, None) => Err(ElementFault::MissingPort(PortDirection::Output)),
        }
    }

    /// Signal end-of-stream downstream, if there is a downstream
    pub(crate) fn finish_output(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.finish();
        }
    }
}

/// Identity and event access for an element while it runs
#[derive(Clone)]
pub struct ElementContext {
    id: ElementId,
    name: String,
    events: Option<EventSender>,
}

impl ElementContext {
    pub(crate) fn new(id: ElementId, name: impl Into<String>, events: Option<EventSender>) -> Self {
        Self {
            id,
            name: name.into(),
            events,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post the stream format this element is producing or consuming
    pub fn report_stream_info(&self, format: AudioFormat) {
        if let Some(events) = &self.events {
            events.post(StatusEvent::stream_info(self.id, self.name.clone(), format));
        }
    }
}

/// A unit of the processing graph
///
/// The pipeline owns every element. While a run is active the element is
/// moved onto its own worker thread, so nothing else can touch it until the
/// run is joined.
pub trait Element: Send + 'static {
    fn kind(&self) -> ElementKind;

    fn capabilities(&self) -> Capabilities {
        self.kind().capabilities()
    }

    /// Called on the worker thread before the first `step`
    fn open(&mut self, _ctx: &ElementContext) -> Result<(), ElementFault> {
        Ok(())
    }

    /// One unit of processing. May block on port reads/writes.
    fn step(&mut self, io: &mut PortIo) -> Result<Step, ElementFault>;

    /// Called on the worker thread after the last `step`, whatever the outcome
    fn close(&mut self) {}

    /// Prepare for a new run
    fn reset(&mut self) {}

    /// Get a reference to self as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get a mutable reference to self as Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
