//! Hardware output doubles

use speechpipe::output::{CaptureOutput, HardwareError, HardwareOutput};
use speechpipe_common::AudioFormat;
use std::thread;
use std::time::Duration;

/// Capture surface that sleeps on every write, keeping a run alive long
/// enough to pause or stop it
#[derive(Clone)]
pub struct SlowOutput {
    capture: CaptureOutput,
    delay: Duration,
}

impl SlowOutput {
    pub fn new(delay: Duration) -> Self {
        Self {
            capture: CaptureOutput::new(),
            delay,
        }
    }

    /// Handle for inspecting what was written
    pub fn capture(&self) -> CaptureOutput {
        self.capture.clone()
    }
}

impl HardwareOutput for SlowOutput {
    fn configure(&mut self, format: &AudioFormat) -> Result<(), HardwareError> {
        self.capture.configure(format)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        thread::sleep(self.delay);
        self.capture.write(bytes)
    }

    fn finish(&mut self) -> Result<(), HardwareError> {
        self.capture.finish()
    }
}

/// Output whose driver panics on the first write
#[derive(Clone, Default)]
pub struct PanickingOutput;

impl HardwareOutput for PanickingOutput {
    fn configure(&mut self, _format: &AudioFormat) -> Result<(), HardwareError> {
        Ok(())
    }

    fn write(&mut self, _bytes: &[u8]) -> Result<(), HardwareError> {
        panic!("output driver crashed");
    }
}
