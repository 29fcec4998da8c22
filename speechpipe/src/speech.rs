//! Speech buffer provider interface
//!
//! The synthesizer fills a byte buffer of unsigned 8-bit PCM and tracks its
//! write position in fine-grained units: one stored sample spans
//! [`POSITION_UNITS_PER_SAMPLE`] units. The provider is fully populated before
//! the pipeline's first pull.

use std::path::Path;
use std::sync::Arc;

/// Synthesizer position units per stored sample
pub const POSITION_UNITS_PER_SAMPLE: usize = 50;

/// Read-only view of a synthesized sample buffer
pub trait SpeechBuffer: Send + Sync {
    /// The populated bytes
    fn buffer(&self) -> &[u8];

    /// Length in synthesizer position units
    fn buffer_len(&self) -> usize;
}

/// Owned in-memory speech buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<u8>,
    position_units: usize,
}

impl SampleBuffer {
    /// Wrap finished 8-bit samples; the length is reported in position units
    pub fn from_samples(samples: Vec<u8>) -> Self {
        let position_units = samples.len() * POSITION_UNITS_PER_SAMPLE;
        Self {
            samples,
            position_units,
        }
    }

    /// Wrap a raw synthesizer buffer with its own position counter
    pub fn with_position(samples: Vec<u8>, position_units: usize) -> Self {
        Self {
            samples,
            position_units,
        }
    }

    /// Load a headerless unsigned 8-bit PCM file
    pub fn from_raw_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_samples(std::fs::read(path)?))
    }

    pub fn into_shared(self) -> Arc<dyn SpeechBuffer> {
        Arc::new(self)
    }
}

impl SpeechBuffer for SampleBuffer {
    fn buffer(&self) -> &[u8] {
        &self.samples
    }

    fn buffer_len(&self) -> usize {
        self.position_units
    }
}
