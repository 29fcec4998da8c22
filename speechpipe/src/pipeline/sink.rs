//! Sink writer: drains the graph into a hardware output surface

use speechpipe_common::AudioFormat;
use std::any::Any;
use tracing::{debug, info};

use super::element::{Element, ElementContext, ElementKind, PortIo, ProcessResult, Step, Upstream};
use crate::error::{ElementFault, Error, Result};
use crate::output::HardwareOutput;

/// Default frames pulled per drive tick
pub const DEFAULT_FRAME_CAPACITY: usize = 256;

/// Element with no output port that forwards frames to the hardware surface
///
/// The clock configuration is fixed at construction. Hardware faults are not
/// retried here: the step fails, the element goes to `Error` and the pipeline
/// is expected to unwind.
pub struct SinkWriter {
    clock: AudioFormat,
    frame_capacity: usize,
    output: Box<dyn HardwareOutput>,
    buf: Vec<u8>,
    bytes_written: u64,
}

impl SinkWriter {
    pub fn new(clock: AudioFormat, output: impl HardwareOutput) -> Result<Self> {
        clock.validate()?;
        let mut sink = Self {
            clock,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            output: Box::new(output),
            buf: Vec::new(),
            bytes_written: 0,
        };
        sink.resize_buffer();
        Ok(sink)
    }

    /// Frames pulled from upstream per drive tick
    pub fn with_frame_capacity(mut self, frames: usize) -> Result<Self> {
        if frames == 0 {
            return Err(Error::InvalidConfig("sink frame capacity must be non-zero".to_string()));
        }
        self.frame_capacity = frames;
        self.resize_buffer();
        Ok(self)
    }

    fn resize_buffer(&mut self) {
        self.buf = vec![0; self.frame_capacity * self.clock.bytes_per_frame()];
    }

    pub fn clock(&self) -> AudioFormat {
        self.clock
    }

    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Whole frames handed to the hardware this run
    pub fn frames_written(&self) -> u64 {
        self.bytes_written / self.clock.bytes_per_frame() as u64
    }

    /// One drive tick: pull up to the frame capacity and forward it
    pub fn drive(&mut self, upstream: &mut dyn Upstream) -> std::result::Result<Step, ElementFault> {
        match upstream.read(&mut self.buf)? {
            ProcessResult::Produced(n) => {
                if n > 0 {
                    self.output.write(&self.buf[..n])?;
                    self.bytes_written += n as u64;
                }
                Ok(Step::Continue)
            }
            ProcessResult::EndOfStream => {
                self.output.finish()?;
                debug!("Sink drained {} frames", self.frames_written());
                Ok(Step::Finished)
            }
        }
    }
}

impl Element for SinkWriter {
    fn kind(&self) -> ElementKind {
        ElementKind::Sink
    }

    fn open(&mut self, ctx: &ElementContext) -> std::result::Result<(), ElementFault> {
        self.output.configure(&self.clock)?;
        self.bytes_written = 0;
        info!(element = ctx.name(), "Sink clock {}", self.clock);
        ctx.report_stream_info(self.clock);
        Ok(())
    }

    fn step(&mut self, io: &mut PortIo) -> std::result::Result<Step, ElementFault> {
        self.drive(io.input()?)
    }

    fn reset(&mut self) {
        self.bytes_written = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
