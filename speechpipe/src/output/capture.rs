//! In-memory output surface
//!
//! Clones share one capture, so a test (or a monitor) can keep a handle while
//! the sink owns the surface on its worker thread.

use speechpipe_common::AudioFormat;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{HardwareError, HardwareOutput};

#[derive(Debug, Default)]
struct CaptureState {
    format: Option<AudioFormat>,
    bytes: Vec<u8>,
    writes: usize,
    finished: bool,
    /// Fail any write that would take the capture past this many bytes
    fail_after: Option<usize>,
}

/// Output surface that records everything written to it
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture that reports a device fault once `limit` bytes have been written
    pub fn failing_after(limit: usize) -> Self {
        let output = Self::new();
        output.lock().fail_after = Some(limit);
        output
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clock configuration applied by the sink, if any
    pub fn format(&self) -> Option<AudioFormat> {
        self.lock().format
    }

    /// Copy of every byte written so far
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}

impl HardwareOutput for CaptureOutput {
    fn configure(&mut self, format: &AudioFormat) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.format = Some(*format);
        state.bytes.clear();
        state.writes = 0;
        state.finished = false;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if state.format.is_none() {
            return Err(HardwareError::NotConfigured);
        }
        if let Some(limit) = state.fail_after {
            if state.bytes.len() + bytes.len() > limit {
                return Err(HardwareError::Device(format!(
                    "write of {} bytes exceeds limit {}",
                    bytes.len(),
                    limit
                )));
            }
        }
        state.bytes.extend_from_slice(bytes);
        state.writes += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HardwareError> {
        self.lock().finished = true;
        Ok(())
    }
}
