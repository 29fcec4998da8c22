//! Per-element run state shared between the pipeline and the element's worker
//!
//! Every state change goes through [`ElementControl::transition`], which posts
//! the status event while still holding the state lock. Concurrent callers
//! (the worker finishing, `stop()` from another thread) therefore produce
//! exactly one event per real change, in the order the changes happened.

use speechpipe_common::{ElementId, ElementState, StatusEvent};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::bus::EventSender;
use super::element::ElementContext;

#[derive(Debug, Default)]
struct ControlState {
    state: ElementState,
    stop_requested: bool,
}

pub(crate) struct ElementControl {
    id: ElementId,
    name: String,
    inner: Mutex<ControlState>,
    changed: Condvar,
    events: Mutex<Option<EventSender>>,
}

impl ElementControl {
    pub(crate) fn new(id: ElementId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inner: Mutex::new(ControlState::default()),
            changed: Condvar::new(),
            events: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> ElementId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> ElementState {
        self.lock().state
    }

    pub(crate) fn set_events(&self, events: Option<EventSender>) {
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = events;
    }

    pub(crate) fn context(&self) -> ElementContext {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner).clone();
        ElementContext::new(self.id, self.name.clone(), events)
    }

    /// Move to `to`; posts a status event if the state actually changed
    pub(crate) fn transition(&self, to: ElementState) -> bool {
        let mut inner = self.lock();
        self.apply(&mut inner, to)
    }

    /// Move `from` → `to` only if currently in `from`
    pub(crate) fn transition_from(&self, from: ElementState, to: ElementState) -> bool {
        let mut inner = self.lock();
        if inner.state != from {
            return false;
        }
        self.apply(&mut inner, to)
    }

    /// Final transition from the worker; skipped once a stop was requested
    pub(crate) fn finish_run(&self, to: ElementState) -> bool {
        let mut inner = self.lock();
        if inner.stop_requested {
            return false;
        }
        self.apply(&mut inner, to)
    }

    fn apply(&self, inner: &mut ControlState, to: ElementState) -> bool {
        if inner.state == to {
            return false;
        }
        debug!(element = %self.name, "{} -> {}", inner.state, to);
        inner.state = to;
        if let Some(events) = self.events.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            events.post(StatusEvent::status(self.id, self.name.clone(), to));
        }
        self.changed.notify_all();
        true
    }

    pub(crate) fn request_stop(&self) {
        let mut inner = self.lock();
        inner.stop_requested = true;
        self.changed.notify_all();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    /// Arm for a new run
    pub(crate) fn clear_stop(&self) {
        self.lock().stop_requested = false;
    }

    /// Block while paused; false once a stop has been requested
    pub(crate) fn checkpoint(&self) -> bool {
        let mut inner = self.lock();
        while inner.state == ElementState::Paused && !inner.stop_requested {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !inner.stop_requested
    }

    /// Block until the element reaches `Stopped` or `Error`
    pub(crate) fn wait_terminal(&self) -> ElementState {
        let mut inner = self.lock();
        while !inner.state.is_terminal() {
            inner = self
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.state
    }
}
