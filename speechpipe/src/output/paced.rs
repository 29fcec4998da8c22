//! Clock pacing for surfaces that accept data faster than real time

use speechpipe_common::AudioFormat;
use std::thread;
use std::time::{Duration, Instant};

use super::{HardwareError, HardwareOutput};

/// Wraps a surface so writes never run ahead of the configured clock
///
/// After each write the caller is held until the wall clock catches up with
/// the audio time written so far, the way a hardware FIFO would block.
pub struct PacedOutput<O> {
    inner: O,
    bytes_per_second: u64,
    started: Option<Instant>,
    written: u64,
}

impl<O: HardwareOutput> PacedOutput<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            bytes_per_second: 0,
            started: None,
            written: 0,
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }

    /// Audio time written since `configure`
    pub fn written_duration(&self) -> Duration {
        if self.bytes_per_second == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(self.written) * 1_000_000_000 / u128::from(self.bytes_per_second);
        Duration::from_nanos(nanos as u64)
    }
}

impl<O: HardwareOutput> HardwareOutput for PacedOutput<O> {
    fn configure(&mut self, format: &AudioFormat) -> Result<(), HardwareError> {
        self.inner.configure(format)?;
        self.bytes_per_second = format.bytes_per_second();
        self.started = None;
        self.written = 0;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), HardwareError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.inner.write(bytes)?;
        self.written += bytes.len() as u64;

        let target = self.written_duration();
        let elapsed = started.elapsed();
        if target > elapsed {
            thread::sleep(target - elapsed);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HardwareError> {
        self.inner.finish()
    }
}
