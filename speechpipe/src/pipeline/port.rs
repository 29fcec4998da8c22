//! Bounded byte ports between neighboring elements
//!
//! A port is a single-producer single-consumer ring buffer of bytes. The
//! upstream element owns the [`PortWriter`], the downstream element owns the
//! [`PortReader`]; the pipeline keeps a [`PortHandle`] so `stop()` can abort a
//! port from outside either element's thread.
//!
//! - `write_all` blocks while the ring is full (backpressure)
//! - `read` blocks until at least one byte is available or end-of-stream
//! - `abort` wakes both sides; every later call fails with `Interrupted`

use ringbuf::{traits::*, HeapRb};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use super::element::{ProcessResult, Upstream};
use crate::error::ElementFault;

struct PortState {
    ring: HeapRb<u8>,
    /// Writer finished: no more bytes after what is buffered
    eos: bool,
    /// Port torn down; both sides bail out
    aborted: bool,
}

struct PortShared {
    name: String,
    state: Mutex<PortState>,
    readable: Condvar,
    writable: Condvar,
}

impl PortShared {
    fn lock(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort(&self) {
        let mut state = self.lock();
        if !state.aborted {
            state.aborted = true;
            trace!(port = %self.name, "Port aborted");
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// Create a connected port of `capacity` bytes
///
/// `capacity` must be non-zero; the pipeline validates it before linking.
pub fn port(name: impl Into<String>, capacity: usize) -> (PortWriter, PortReader, PortHandle) {
    let shared = Arc::new(PortShared {
        name: name.into(),
        state: Mutex::new(PortState {
            ring: HeapRb::new(capacity.max(1)),
            eos: false,
            aborted: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });

    (
        PortWriter {
            shared: Arc::clone(&shared),
            finished: false,
        },
        PortReader {
            shared: Arc::clone(&shared),
        },
        PortHandle { shared },
    )
}

/// Upstream side of a port
pub struct PortWriter {
    shared: Arc<PortShared>,
    finished: bool,
}

impl PortWriter {
    /// Push every byte of `data`, blocking while the ring is full
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<(), ElementFault> {
        while !data.is_empty() {
            let mut state = self.shared.lock();
            loop {
                if state.aborted {
                    return Err(ElementFault::Interrupted);
                }
                if !state.ring.is_full() {
                    break;
                }
                state = self
                    .shared
                    .writable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            let pushed = state.ring.push_slice(data);
            data = &data[pushed..];
            self.shared.readable.notify_all();
        }
        Ok(())
    }

    /// Signal end-of-stream; buffered bytes stay readable
    pub fn finish(&mut self) {
        let mut state = self.shared.lock();
        state.eos = true;
        self.finished = true;
        self.shared.readable.notify_all();
    }
}

impl Drop for PortWriter {
    fn drop(&mut self) {
        // Writer vanished without end-of-stream: the reader must not wait forever
        if !self.finished {
            self.shared.abort();
        }
    }
}

/// Downstream side of a port
pub struct PortReader {
    shared: Arc<PortShared>,
}

impl PortReader {
    /// Pop up to `buf.len()` bytes, blocking until data or end-of-stream
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ProcessResult, ElementFault> {
        if buf.is_empty() {
            return Ok(ProcessResult::Produced(0));
        }
        let mut state = self.shared.lock();
        loop {
            if state.aborted {
                return Err(ElementFault::Interrupted);
            }
            if !state.ring.is_empty() {
                let n = state.ring.pop_slice(buf);
                self.shared.writable.notify_all();
                return Ok(ProcessResult::Produced(n));
            }
            if state.eos {
                return Ok(ProcessResult::EndOfStream);
            }
            state = self
                .shared
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Upstream for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<ProcessResult, ElementFault> {
        PortReader::read(self, buf)
    }
}

impl Drop for PortReader {
    fn drop(&mut self) {
        // Nobody left to drain: unblock the writer
        self.shared.abort();
    }
}

/// Out-of-band handle kept by the pipeline for cancellation and stats
#[derive(Clone)]
pub struct PortHandle {
    shared: Arc<PortShared>,
}

impl PortHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Wake and fail both sides of the port
    pub fn abort(&self) {
        self.shared.abort();
    }

    pub fn stats(&self) -> PortStats {
        let state = self.shared.lock();
        PortStats {
            capacity: state.ring.capacity().into(),
            occupied: state.ring.occupied_len(),
            eos: state.eos,
            aborted: state.aborted,
        }
    }
}

/// Port fill statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStats {
    /// Capacity in bytes
    pub capacity: usize,
    /// Bytes currently buffered
    pub occupied: usize,
    pub eos: bool,
    pub aborted: bool,
}

impl PortStats {
    /// Fill level (0.0 to 1.0)
    pub fn fill_percent(&self) -> f32 {
        self.occupied as f32 / self.capacity as f32
    }
}
