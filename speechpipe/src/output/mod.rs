//! Hardware output surfaces
//!
//! The sink writer drains finished frames into a [`HardwareOutput`]. The
//! engine never touches device registers; it only configures the clock once
//! and then performs blocking writes.
//!
//! Provided surfaces:
//! - [`CaptureOutput`]: in-memory, with a shareable handle for inspection
//! - [`WavOutput`]: writes a WAV file via hound
//! - [`PacedOutput`]: wraps another surface and paces writes to the clock

pub mod capture;
pub mod paced;
pub mod wav;

pub use capture::CaptureOutput;
pub use paced::PacedOutput;
pub use wav::WavOutput;

use speechpipe_common::AudioFormat;
use thiserror::Error;

/// Fault reported by a hardware output surface
#[derive(Error, Debug)]
pub enum HardwareError {
    /// Write before `configure`
    #[error("output not configured")]
    NotConfigured,

    /// Clock configuration the surface cannot honor
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// Device-level write failure
    #[error("device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Clocked output the sink writer drives
pub trait HardwareOutput: Send + 'static {
    /// Apply the clock configuration; called once before the first write
    fn configure(&mut self, format: &AudioFormat) -> Result<(), HardwareError>;

    /// Blocking write of a byte span
    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError>;

    /// Flush after the last write of a run
    fn finish(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

impl<O: HardwareOutput + ?Sized> HardwareOutput for Box<O> {
    fn configure(&mut self, format: &AudioFormat) -> Result<(), HardwareError> {
        (**self).configure(format)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        (**self).write(bytes)
    }

    fn finish(&mut self) -> Result<(), HardwareError> {
        (**self).finish()
    }
}
