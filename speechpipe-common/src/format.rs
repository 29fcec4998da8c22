//! PCM stream format description

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Interleaved little-endian PCM format: clock rate, bit depth, channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second (Hz)
    pub sample_rate: u32,
    /// Bits per sample (8, 16, 24 or 32)
    pub bits_per_sample: u16,
    /// Samples per frame
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
        }
    }

    /// Bytes occupied by one sample
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes occupied by one interleaved frame
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Byte rate at this clock
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * self.bytes_per_frame() as u64
    }

    /// Reject formats no output surface can clock
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate > 768_000 {
            return Err(Error::InvalidInput(format!(
                "sample rate {} Hz out of range",
                self.sample_rate
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(Error::InvalidInput(format!(
                "unsupported bit depth {}",
                self.bits_per_sample
            )));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(Error::InvalidInput(format!(
                "channel count {} out of range (1-8)",
                self.channels
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {}-bit / {} ch",
            self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        let format = AudioFormat::new(22050, 16, 2);
        assert_eq!(format.bytes_per_sample(), 2);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.bytes_per_second(), 88200);
    }

    #[test]
    fn test_validate_rejects_odd_depths() {
        assert!(AudioFormat::new(22050, 16, 2).validate().is_ok());
        assert!(AudioFormat::new(22050, 12, 2).validate().is_err());
        assert!(AudioFormat::new(0, 16, 2).validate().is_err());
        assert!(AudioFormat::new(44100, 16, 0).validate().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(AudioFormat::new(22050, 16, 2).to_string(), "22050 Hz / 16-bit / 2 ch");
    }
}
