//! Format/resample filter
//!
//! Sits between two ports and repacks the stream from the source format to
//! the destination format. Three plans, chosen once at construction:
//!
//! - **PassThrough**: same rate, and channels already match (or upstream has
//!   already widened its frames). Bytes are forwarded untouched.
//! - **Remix**: same rate, different channel count. Duplication when
//!   widening, averaging when narrowing.
//! - **Resample**: different rates. Remix first, then rubato interpolation.
//!
//! Bit depth is preserved throughout.

use serde::Deserialize;
use speechpipe_common::AudioFormat;
use std::any::Any;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::element::{Element, ElementContext, ElementKind, PortIo, ProcessResult, Step, Upstream};
use crate::audio::pcm;
use crate::audio::{CodecDirection, RateConverter};
use crate::error::{ElementFault, Error, Result};

/// Bytes pulled from upstream per refill
pub const DEFAULT_SCRATCH_BYTES: usize = 4096;

/// Format filter configuration, fixed before the pipeline starts
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub src_rate: u32,
    pub src_channels: u16,
    pub dest_rate: u32,
    pub dest_channels: u16,
    /// Shared by source and destination
    pub bits_per_sample: u16,
    pub direction: CodecDirection,
    /// Resampler chunk size in frames
    pub chunk_frames: usize,
    /// Upstream frames already carry the destination channel count
    pub input_widened: bool,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            src_rate: 22050,
            src_channels: 1,
            dest_rate: 22050,
            dest_channels: 2,
            bits_per_sample: 16,
            direction: CodecDirection::Encode,
            chunk_frames: 1024,
            input_widened: true,
        }
    }
}

impl ResampleConfig {
    pub fn validate(&self) -> Result<()> {
        if !pcm::is_supported_depth(self.bits_per_sample) {
            return Err(Error::InvalidConfig(format!(
                "filter bit depth must be one of {:?}, got {}",
                pcm::SUPPORTED_BITS,
                self.bits_per_sample
            )));
        }
        self.source_format().validate()?;
        self.dest_format().validate()?;
        if self.chunk_frames == 0 {
            return Err(Error::InvalidConfig("filter chunk_frames must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Channel count of the frames actually arriving from upstream
    pub fn effective_src_channels(&self) -> u16 {
        if self.input_widened {
            self.dest_channels
        } else {
            self.src_channels
        }
    }

    pub fn source_format(&self) -> AudioFormat {
        AudioFormat::new(self.src_rate, self.bits_per_sample, self.effective_src_channels())
    }

    pub fn dest_format(&self) -> AudioFormat {
        AudioFormat::new(self.dest_rate, self.bits_per_sample, self.dest_channels)
    }

    pub fn plan(&self) -> Plan {
        if self.src_rate != self.dest_rate {
            Plan::Resample
        } else if self.effective_src_channels() != self.dest_channels {
            Plan::Remix
        } else {
            Plan::PassThrough
        }
    }
}

/// Transform chosen for a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    PassThrough,
    Remix,
    Resample,
}

/// Element with one input and one output port that converts formats
pub struct FormatFilter {
    config: ResampleConfig,
    plan: Plan,
    converter: Option<RateConverter>,
    /// Trailing partial input frame from the last refill
    carry: Vec<u8>,
    /// Converted bytes not yet handed downstream
    pending: VecDeque<u8>,
    scratch: Vec<u8>,
    step_buf: Vec<u8>,
    upstream_done: bool,
}

impl FormatFilter {
    pub fn new(config: ResampleConfig) -> Result<Self> {
        config.validate()?;
        let plan = config.plan();
        let converter = match plan {
            Plan::Resample => Some(Self::build_converter(&config)?),
            _ => None,
        };

        Ok(Self {
            config,
            plan,
            converter,
            carry: Vec::new(),
            pending: VecDeque::new(),
            scratch: vec![0; DEFAULT_SCRATCH_BYTES],
            step_buf: vec![0; DEFAULT_SCRATCH_BYTES],
            upstream_done: false,
        })
    }

    fn build_converter(config: &ResampleConfig) -> Result<RateConverter> {
        RateConverter::new(
            config.src_rate,
            config.dest_rate,
            config.dest_channels,
            config.chunk_frames,
            config.direction,
        )
    }

    /// Bytes pulled from upstream per refill
    pub fn with_scratch_bytes(mut self, bytes: usize) -> Self {
        let bytes = bytes.max(1);
        self.scratch = vec![0; bytes];
        self.step_buf = vec![0; bytes];
        self
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    pub fn plan(&self) -> Plan {
        self.plan
    }

    /// Converted bytes still waiting to go downstream
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Pull from `upstream` and fill `buf` with converted bytes
    ///
    /// Returns `Produced(bytes)`. `EndOfStream` is only reported once
    /// upstream has ended and every converted byte has been handed out.
    pub fn read(
        &mut self,
        upstream: &mut dyn Upstream,
        buf: &mut [u8],
    ) -> std::result::Result<ProcessResult, ElementFault> {
        if buf.is_empty() {
            return Ok(ProcessResult::Produced(0));
        }

        loop {
            if !self.pending.is_empty() {
                let n = buf.len().min(self.pending.len());
                for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
                    *dst = src;
                }
                return Ok(ProcessResult::Produced(n));
            }
            if self.upstream_done {
                return Ok(ProcessResult::EndOfStream);
            }

            let mut scratch = std::mem::take(&mut self.scratch);
            let refill = self.refill(upstream, &mut scratch);
            self.scratch = scratch;
            if !refill? {
                // Upstream made no progress this call
                return Ok(ProcessResult::Produced(0));
            }
        }
    }

    /// One upstream pull; false when upstream produced nothing
    fn refill(
        &mut self,
        upstream: &mut dyn Upstream,
        scratch: &mut [u8],
    ) -> std::result::Result<bool, ElementFault> {
        match upstream.read(scratch)? {
            ProcessResult::Produced(0) => Ok(false),
            ProcessResult::Produced(n) => {
                self.convert(&scratch[..n])?;
                Ok(true)
            }
            ProcessResult::EndOfStream => {
                self.finish()?;
                self.upstream_done = true;
                Ok(true)
            }
        }
    }

    fn convert(&mut self, bytes: &[u8]) -> std::result::Result<(), ElementFault> {
        if self.plan == Plan::PassThrough {
            self.pending.extend(bytes);
            return Ok(());
        }

        self.carry.extend_from_slice(bytes);
        let frame_bytes = self.config.source_format().bytes_per_frame();
        let whole = self.carry.len() / frame_bytes * frame_bytes;
        if whole == 0 {
            return Ok(());
        }

        let mut samples = Vec::new();
        pcm::decode(&self.carry[..whole], self.config.bits_per_sample, &mut samples);
        self.carry.drain(..whole);

        let remixed = pcm::remix(
            &samples,
            usize::from(self.config.effective_src_channels()),
            usize::from(self.config.dest_channels),
        );

        match self.converter.as_mut() {
            Some(converter) => {
                let planar = RateConverter::deinterleave(&remixed, converter.channels());
                converter.push(&planar)?;
                self.drain_converter();
            }
            None => self.emit(&remixed),
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<(), ElementFault> {
        if !self.carry.is_empty() {
            debug!("Dropping {} bytes of incomplete trailing frame", self.carry.len());
            self.carry.clear();
        }
        if let Some(converter) = self.converter.as_mut() {
            converter.flush()?;
            self.drain_converter();
        }
        Ok(())
    }

    fn drain_converter(&mut self) {
        let Some(converter) = self.converter.as_mut() else {
            return;
        };
        let bits = self.config.bits_per_sample;
        let samples: Vec<i32> = RateConverter::interleave(&converter.take_output())
            .into_iter()
            .map(|value| pcm::quantize(value, bits))
            .collect();
        self.emit(&samples);
    }

    fn emit(&mut self, samples: &[i32]) {
        let mut bytes = Vec::new();
        pcm::encode(samples, self.config.bits_per_sample, &mut bytes);
        self.pending.extend(bytes);
    }
}

impl Element for FormatFilter {
    fn kind(&self) -> ElementKind {
        ElementKind::Filter
    }

    fn open(&mut self, ctx: &ElementContext) -> std::result::Result<(), ElementFault> {
        info!(
            element = ctx.name(),
            plan = ?self.plan,
            direction = %self.config.direction,
            "Filter {} -> {}",
            self.config.source_format(),
            self.config.dest_format()
        );
        ctx.report_stream_info(self.config.dest_format());
        Ok(())
    }

    fn step(&mut self, io: &mut PortIo) -> std::result::Result<Step, ElementFault> {
        let (input, output) = io.both()?;
        let mut chunk = std::mem::take(&mut self.step_buf);
        let step = match self.read(input, &mut chunk) {
            Ok(ProcessResult::Produced(n)) => output.write_all(&chunk[..n]).map(|()| Step::Continue),
            Ok(ProcessResult::EndOfStream) => Ok(Step::Finished),
            Err(fault) => Err(fault),
        };
        self.step_buf = chunk;
        step
    }

    fn reset(&mut self) {
        self.carry.clear();
        self.pending.clear();
        self.upstream_done = false;
        if let Some(converter) = self.converter.as_mut() {
            converter.reset();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
