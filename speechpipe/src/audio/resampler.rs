//! Streaming sample-rate conversion using rubato
//!
//! Input arrives in arbitrary pieces from a port; rubato wants fixed-size
//! chunks. [`RateConverter`] queues planar input until the engine's next chunk
//! is complete, trims the engine's startup delay from the output, and on
//! [`flush`](RateConverter::flush) pads the tail so the stream ends with
//! exactly `round(frames_in * dest / src)` frames.

use rubato::{FastFixedIn, FastFixedOut, PolynomialDegree, Resampler as RubatoResampler};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{ElementFault, Error, Result};

/// Which side of the conversion is fixed-size
///
/// `Decode` consumes fixed input chunks (the stream is being unpacked for
/// playback); `Encode` produces fixed output chunks (the stream is being
/// packed for a clocked consumer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecDirection {
    Decode,
    #[default]
    Encode,
}

impl fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecDirection::Decode => write!(f, "decode"),
            CodecDirection::Encode => write!(f, "encode"),
        }
    }
}

enum Engine {
    FixedIn(FastFixedIn<f64>),
    FixedOut(FastFixedOut<f64>),
}

impl Engine {
    fn input_frames_next(&self) -> usize {
        match self {
            Engine::FixedIn(r) => r.input_frames_next(),
            Engine::FixedOut(r) => r.input_frames_next(),
        }
    }

    fn output_delay(&self) -> usize {
        match self {
            Engine::FixedIn(r) => r.output_delay(),
            Engine::FixedOut(r) => r.output_delay(),
        }
    }

    fn reset(&mut self) {
        match self {
            Engine::FixedIn(r) => r.reset(),
            Engine::FixedOut(r) => r.reset(),
        }
    }

    fn process(&mut self, input: &[Vec<f64>]) -> std::result::Result<Vec<Vec<f64>>, ElementFault> {
        let result = match self {
            Engine::FixedIn(r) => r.process(input, None),
            Engine::FixedOut(r) => r.process(input, None),
        };
        result.map_err(|e| ElementFault::Resample(e.to_string()))
    }

    fn process_partial(
        &mut self,
        input: Option<&[Vec<f64>]>,
    ) -> std::result::Result<Vec<Vec<f64>>, ElementFault> {
        let result = match self {
            Engine::FixedIn(r) => r.process_partial(input, None),
            Engine::FixedOut(r) => r.process_partial(input, None),
        };
        result.map_err(|e| ElementFault::Resample(e.to_string()))
    }
}

/// Stateful rate converter for one stream
pub struct RateConverter {
    engine: Engine,
    channels: usize,
    ratio: f64,
    /// Planar input not yet handed to the engine
    pending: Vec<Vec<f64>>,
    /// Planar output not yet taken by the caller
    output: Vec<Vec<f64>>,
    /// Startup delay frames still to drop
    delay_left: usize,
    frames_in: u64,
    frames_out: u64,
}

impl RateConverter {
    /// Create a converter from `input_rate` to `output_rate`
    ///
    /// `chunk_frames` is the engine's fixed chunk: input frames for
    /// [`CodecDirection::Decode`], output frames for [`CodecDirection::Encode`].
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        chunk_frames: usize,
        direction: CodecDirection,
    ) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || channels == 0 || chunk_frames == 0 {
            return Err(Error::InvalidConfig(format!(
                "resampler needs non-zero rates, channels and chunk size (got {} -> {} Hz, {} ch, chunk {})",
                input_rate, output_rate, channels, chunk_frames
            )));
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let channels = channels as usize;

        let engine = match direction {
            CodecDirection::Decode => FastFixedIn::<f64>::new(
                ratio,
                1.0, // max_relative_ratio (no runtime changes)
                PolynomialDegree::Septic,
                chunk_frames,
                channels,
            )
            .map(Engine::FixedIn),
            CodecDirection::Encode => FastFixedOut::<f64>::new(
                ratio,
                1.0,
                PolynomialDegree::Septic,
                chunk_frames,
                channels,
            )
            .map(Engine::FixedOut),
        }
        .map_err(|e| Error::InvalidConfig(format!("Failed to create resampler: {}", e)))?;

        let delay_left = engine.output_delay();
        debug!(
            "Resampler {}Hz -> {}Hz ({} channels, {}, chunk {}, delay {} frames)",
            input_rate, output_rate, channels, direction, chunk_frames, delay_left
        );

        Ok(Self {
            engine,
            channels,
            ratio,
            pending: vec![Vec::new(); channels],
            output: vec![Vec::new(); channels],
            delay_left,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Output frames the whole stream yields once flushed
    pub fn expected_output_frames(&self) -> u64 {
        (self.frames_in as f64 * self.ratio).round() as u64
    }

    /// Queue planar input and convert every complete chunk
    pub fn push(&mut self, planar: &[Vec<f64>]) -> std::result::Result<(), ElementFault> {
        let Some(first) = planar.first() else {
            return Ok(());
        };
        self.frames_in += first.len() as u64;
        for (queued, channel) in self.pending.iter_mut().zip(planar) {
            queued.extend_from_slice(channel);
        }

        loop {
            let needed = self.engine.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f64>> = self
                .pending
                .iter_mut()
                .map(|queued| queued.drain(..needed).collect())
                .collect();
            let converted = self.engine.process(&chunk)?;
            self.emit(converted);
        }
        Ok(())
    }

    /// Convert whatever is queued and pad the tail to the expected length
    pub fn flush(&mut self) -> std::result::Result<(), ElementFault> {
        let expected = self.expected_output_frames();

        if !self.pending[0].is_empty() {
            let rest = std::mem::replace(&mut self.pending, vec![Vec::new(); self.channels]);
            let converted = self.engine.process_partial(Some(rest.as_slice()))?;
            self.emit(converted);
        }

        while self.frames_out < expected {
            let converted = self.engine.process_partial(None)?;
            if converted.first().map_or(true, Vec::is_empty) {
                break;
            }
            self.emit(converted);
        }

        if self.frames_out > expected {
            let excess = (self.frames_out - expected) as usize;
            for channel in &mut self.output {
                channel.truncate(channel.len().saturating_sub(excess));
            }
            self.frames_out = expected;
        }

        debug!(
            "Resampler flushed: {} frames in, {} frames out",
            self.frames_in, self.frames_out
        );
        Ok(())
    }

    /// Discard all stream state and start over with the same parameters
    pub fn reset(&mut self) {
        self.engine.reset();
        self.pending = vec![Vec::new(); self.channels];
        self.output = vec![Vec::new(); self.channels];
        self.delay_left = self.engine.output_delay();
        self.frames_in = 0;
        self.frames_out = 0;
    }

    /// Take converted planar output accumulated so far
    pub fn take_output(&mut self) -> Vec<Vec<f64>> {
        std::mem::replace(&mut self.output, vec![Vec::new(); self.channels])
    }

    fn emit(&mut self, converted: Vec<Vec<f64>>) {
        let produced = converted.first().map_or(0, Vec::len);
        let skip = self.delay_left.min(produced);
        self.delay_left -= skip;
        for (out, channel) in self.output.iter_mut().zip(&converted) {
            out.extend_from_slice(&channel[skip..]);
        }
        self.frames_out += (produced - skip) as u64;
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    pub fn deinterleave(samples: &[i32], channels: usize) -> Vec<Vec<f64>> {
        let num_frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(num_frames); channels];

        for frame in samples.chunks_exact(channels) {
            for (ch_idx, &sample) in frame.iter().enumerate() {
                planar[ch_idx].push(sample as f64);
            }
        }

        planar
    }

    /// Convert planar samples to interleaved format.
    ///
    /// Input:  [[L, L, L, ...], [R, R, R, ...]]
    /// Output: [L, R, L, R, L, R, ...]
    pub fn interleave(planar: &[Vec<f64>]) -> Vec<f64> {
        if planar.is_empty() {
            return Vec::new();
        }

        let num_channels = planar.len();
        let num_frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for channel in planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32) -> Vec<f64> {
        (0..frames)
            .map(|i| {
                let t = i as f64 / rate as f64;
                (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 8000.0
            })
            .collect()
    }

    fn run_all(converter: &mut RateConverter, planar: &[Vec<f64>], piece: usize) -> Vec<Vec<f64>> {
        let frames = planar[0].len();
        let mut start = 0;
        while start < frames {
            let end = (start + piece).min(frames);
            let slice: Vec<Vec<f64>> = planar.iter().map(|ch| ch[start..end].to_vec()).collect();
            converter.push(&slice).unwrap();
            start = end;
        }
        converter.flush().unwrap();
        converter.take_output()
    }

    #[test]
    fn test_deinterleave() {
        let interleaved = vec![1, 2, 3, 4, 5, 6]; // 3 stereo frames
        let planar = RateConverter::deinterleave(&interleaved, 2);

        assert_eq!(planar.len(), 2); // 2 channels
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]); // Left channel
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]); // Right channel
    }

    #[test]
    fn test_interleave() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        let interleaved = RateConverter::interleave(&planar);

        assert_eq!(interleaved, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_deinterleave_mono() {
        let planar = RateConverter::deinterleave(&[1, 2, 3, 4], 1);

        assert_eq!(planar.len(), 1);
        assert_eq!(planar[0], vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_interleave_empty() {
        assert_eq!(RateConverter::interleave(&[]), Vec::<f64>::new());
    }

    #[test]
    fn test_rejects_zero_rate() {
        let result = RateConverter::new(0, 44100, 2, 256, CodecDirection::Decode);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_downsample_exact_length() {
        // 48k -> 44.1k, stereo, fed in uneven pieces
        let input = sine(1000, 48000);
        let planar = vec![input.clone(), input];
        let mut converter = RateConverter::new(48000, 44100, 2, 256, CodecDirection::Decode).unwrap();

        let output = run_all(&mut converter, &planar, 97);
        let expected_frames = (1000.0f64 * 44100.0 / 48000.0).round() as usize;
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].len(), expected_frames);
        assert_eq!(output[1].len(), expected_frames);
    }

    #[test]
    fn test_upsample_exact_length_fixed_output() {
        let planar = vec![sine(500, 22050)];
        let mut converter = RateConverter::new(22050, 44100, 1, 128, CodecDirection::Encode).unwrap();

        let output = run_all(&mut converter, &planar, 37);
        assert_eq!(output[0].len(), 1000);
    }

    #[test]
    fn test_reset_repeats_identical_stream() {
        let planar = vec![sine(700, 22050)];
        let mut converter = RateConverter::new(22050, 44100, 1, 128, CodecDirection::Encode).unwrap();

        let first = run_all(&mut converter, &planar, 61);
        converter.reset();
        assert_eq!(converter.expected_output_frames(), 0);
        let second = run_all(&mut converter, &planar, 61);

        assert_eq!(first[0].len(), 1400);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_drops_queued_input() {
        let mut converter = RateConverter::new(48000, 44100, 2, 256, CodecDirection::Decode).unwrap();
        // Less than one chunk: stays queued
        converter.push(&[vec![1.0; 100], vec![1.0; 100]]).unwrap();
        converter.reset();

        converter.flush().unwrap();
        let output = converter.take_output();
        assert!(output.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_constant_signal_survives_conversion() {
        let planar = vec![vec![1000.0; 2000]];
        let mut converter = RateConverter::new(22050, 16000, 1, 256, CodecDirection::Decode).unwrap();

        let output = run_all(&mut converter, &planar, 300);
        let frames = output[0].len();
        // Skip the edges where the interpolator sees padding
        for &value in &output[0][16..frames * 8 / 10] {
            assert!((value - 1000.0).abs() < 1.0, "got {}", value);
        }
    }
}
