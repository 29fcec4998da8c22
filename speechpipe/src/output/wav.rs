//! WAV file output surface

use hound::{SampleFormat, WavSpec, WavWriter};
use speechpipe_common::AudioFormat;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{HardwareError, HardwareOutput};
use crate::audio::pcm;

/// Writes the stream as integer PCM into a WAV file
///
/// The file is created on `configure`, so reconfiguring starts a fresh file.
pub struct WavOutput {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    bits: u16,
    /// Trailing bytes of a sample split across writes
    carry: Vec<u8>,
    samples: Vec<i32>,
}

impl WavOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            bits: 16,
            carry: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HardwareOutput for WavOutput {
    fn configure(&mut self, format: &AudioFormat) -> Result<(), HardwareError> {
        if !pcm::is_supported_depth(format.bits_per_sample) {
            return Err(HardwareError::Unsupported(format!(
                "WAV output supports {:?}-bit samples, got {}",
                pcm::SUPPORTED_BITS,
                format.bits_per_sample
            )));
        }

        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        self.writer = Some(WavWriter::create(&self.path, spec)?);
        self.bits = format.bits_per_sample;
        self.carry.clear();
        info!("Writing {} to {}", format, self.path.display());
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        let writer = self.writer.as_mut().ok_or(HardwareError::NotConfigured)?;

        self.carry.extend_from_slice(bytes);
        let width = pcm::sample_bytes(self.bits);
        let whole = self.carry.len() / width * width;

        self.samples.clear();
        pcm::decode(&self.carry[..whole], self.bits, &mut self.samples);
        self.carry.drain(..whole);

        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HardwareError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            debug!("Finalized {}", self.path.display());
        }
        Ok(())
    }
}
