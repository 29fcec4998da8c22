//! Source adapter: pulls synthesized speech into the graph
//!
//! Reads unsigned 8-bit samples from a [`SpeechBuffer`] and widens each one
//! into a 16-bit little-endian frame: low byte zero, high byte the sample.
//! The read position is owned by the adapter and only moves forward within a
//! run.

use speechpipe_common::AudioFormat;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use super::element::{Element, ElementContext, ElementKind, PortIo, ProcessResult, Step, Upstream};
use crate::error::ElementFault;
use crate::speech::{SpeechBuffer, POSITION_UNITS_PER_SAMPLE};

/// Destination bytes per produced frame
pub const BYTES_PER_FRAME: usize = 2;

/// Default destination bytes requested per step
pub const DEFAULT_PULL_CAPACITY: usize = 1024;

/// Element with no input port that feeds speech samples downstream
pub struct SourceAdapter {
    buffer: Arc<dyn SpeechBuffer>,
    position: usize,
    sample_rate: u32,
    scratch: Vec<u8>,
}

impl SourceAdapter {
    pub fn new(buffer: Arc<dyn SpeechBuffer>, sample_rate: u32) -> Self {
        Self {
            buffer,
            position: 0,
            sample_rate,
            scratch: vec![0; DEFAULT_PULL_CAPACITY],
        }
    }

    /// Destination bytes requested per step
    pub fn with_pull_capacity(mut self, capacity: usize) -> Self {
        self.scratch = vec![0; capacity.max(BYTES_PER_FRAME)];
        self
    }

    /// Usable samples in the buffer for this run
    pub fn total(&self) -> usize {
        usable_samples(self.buffer.as_ref())
    }

    /// Samples consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.total().saturating_sub(self.position)
    }

    /// Format of the frames this adapter produces
    pub fn output_format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, 16, 1)
    }

    /// Fill `dest` with widened frames
    ///
    /// Returns `Produced(frames)`, where each frame occupies two bytes of
    /// `dest`, or `EndOfStream` once every usable sample has been consumed.
    /// A `dest` shorter than one frame produces nothing and moves nothing.
    pub fn pull(&mut self, dest: &mut [u8]) -> ProcessResult {
        pull_into(self.buffer.as_ref(), &mut self.position, dest)
    }
}

fn usable_samples(buffer: &dyn SpeechBuffer) -> usize {
    (buffer.buffer_len() / POSITION_UNITS_PER_SAMPLE).min(buffer.buffer().len())
}

fn pull_into(buffer: &dyn SpeechBuffer, position: &mut usize, dest: &mut [u8]) -> ProcessResult {
    let total = usable_samples(buffer);
    let available = total.saturating_sub(*position);
    if available == 0 {
        return ProcessResult::EndOfStream;
    }

    let frames = (dest.len() / BYTES_PER_FRAME).min(available);
    let samples = &buffer.buffer()[*position..*position + frames];
    for (frame, &sample) in dest.chunks_exact_mut(BYTES_PER_FRAME).zip(samples) {
        frame[0] = 0;
        frame[1] = sample;
    }
    *position += frames;
    ProcessResult::Produced(frames)
}

impl Upstream for SourceAdapter {
    fn read(&mut self, buf: &mut [u8]) -> Result<ProcessResult, ElementFault> {
        Ok(match self.pull(buf) {
            ProcessResult::Produced(frames) => ProcessResult::Produced(frames * BYTES_PER_FRAME),
            ProcessResult::EndOfStream => ProcessResult::EndOfStream,
        })
    }
}

impl Element for SourceAdapter {
    fn kind(&self) -> ElementKind {
        ElementKind::Source
    }

    fn open(&mut self, ctx: &ElementContext) -> Result<(), ElementFault> {
        debug!(element = ctx.name(), total = self.total(), "Source adapter opened");
        ctx.report_stream_info(self.output_format());
        Ok(())
    }

    fn step(&mut self, io: &mut PortIo) -> Result<Step, ElementFault> {
        match pull_into(self.buffer.as_ref(), &mut self.position, &mut self.scratch) {
            ProcessResult::Produced(frames) => {
                io.output()?.write_all(&self.scratch[..frames * BYTES_PER_FRAME])?;
                Ok(Step::Continue)
            }
            ProcessResult::EndOfStream => Ok(Step::Finished),
        }
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
