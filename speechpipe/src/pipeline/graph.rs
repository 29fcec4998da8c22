//! Pipeline graph: element registry, link order, run/stop lifecycle
//!
//! The pipeline exclusively owns its elements and is the only thing that
//! changes their run state. While a run is active each linked element lives
//! on its own worker thread; `stop()` wakes and joins them and takes the
//! elements back.
//!
//! Lifecycle:
//! ```text
//! Idle --run--> Running <--pause/resume--> Paused
//!                  |                          |
//!                  +----------stop------------+--> Stopped --reset--> Idle
//! ```

use serde::Deserialize;
use speechpipe_common::{ElementId, ElementState};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::bus::{EventBus, EventSender};
use super::control::ElementControl;
use super::element::{Capabilities, Element, ElementKind, PortIo};
use super::port::{port, PortHandle, PortStats};
use super::worker;
use crate::error::{Error, PortDirection, Result};

/// Default bytes buffered between neighboring elements
pub const DEFAULT_PORT_CAPACITY: usize = 4096;

/// Pipeline-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Ring buffer size of every port, in bytes
    pub port_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            port_capacity: DEFAULT_PORT_CAPACITY,
        }
    }
}

struct Slot {
    kind: ElementKind,
    capabilities: Capabilities,
    control: Arc<ElementControl>,
    /// None while the element is out on its worker thread
    element: Option<Box<dyn Element>>,
    worker: Option<JoinHandle<Box<dyn Element>>>,
    input_port: Option<PortHandle>,
}

/// Named registry of elements driven as one unit
pub struct Pipeline {
    settings: PipelineSettings,
    slots: HashMap<String, Slot>,
    link_order: Vec<String>,
    events: Option<EventSender>,
    state: ElementState,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            slots: HashMap::new(),
            link_order: Vec::new(),
            events: None,
            state: ElementState::Idle,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Pipeline-level run state
    pub fn state(&self) -> ElementState {
        self.state
    }

    fn require_inactive(&self, operation: &'static str) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<&Slot> {
        self.slots
            .get(name)
            .ok_or_else(|| Error::UnknownElement(name.to_string()))
    }

    // ===== Registry =====

    /// Add an element under a unique name
    pub fn register<E: Element>(&mut self, name: impl Into<String>, element: E) -> Result<ElementId> {
        self.register_boxed(name, Box::new(element))
    }

    pub fn register_boxed(&mut self, name: impl Into<String>, element: Box<dyn Element>) -> Result<ElementId> {
        let name = name.into();
        self.require_inactive("register")?;
        if self.slots.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }

        let id = ElementId::new();
        let control = Arc::new(ElementControl::new(id, name.clone()));
        control.set_events(self.events.clone());
        let kind = element.kind();

        info!("Registered {} element '{}' ({})", kind, name, id);
        self.slots.insert(
            name,
            Slot {
                kind,
                capabilities: element.capabilities(),
                control,
                element: Some(element),
                worker: None,
                input_port: None,
            },
        );
        Ok(id)
    }

    /// Remove an element and hand it back; drops the link order if it was linked
    pub fn unregister(&mut self, name: &str) -> Result<Box<dyn Element>> {
        self.require_inactive("unregister")?;
        let slot = self
            .slots
            .remove(name)
            .ok_or_else(|| Error::UnknownElement(name.to_string()))?;

        if self.link_order.iter().any(|linked| linked == name) {
            warn!("Unregistering linked element '{}', link order cleared", name);
            self.link_order.clear();
        }
        slot.element
            .ok_or_else(|| Error::Worker(format!("element '{}' was lost by a failed worker", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Registered names, sorted
    pub fn element_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn element_id(&self, name: &str) -> Result<ElementId> {
        Ok(self.slot(name)?.control.id())
    }

    pub fn element_kind(&self, name: &str) -> Result<ElementKind> {
        Ok(self.slot(name)?.kind)
    }

    pub fn element_state(&self, name: &str) -> Result<ElementState> {
        Ok(self.slot(name)?.control.state())
    }

    /// Typed access to a registered element while no run is active
    pub fn element<T: Element>(&self, name: &str) -> Result<&T> {
        let slot = self.slot(name)?;
        let element = slot.element.as_ref().ok_or(Error::InvalidState {
            operation: "element",
            state: self.state,
        })?;
        (**element)
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| Error::ElementType(name.to_string()))
    }

    pub fn element_mut<T: Element>(&mut self, name: &str) -> Result<&mut T> {
        let state = self.state;
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| Error::UnknownElement(name.to_string()))?;
        let element = slot.element.as_mut().ok_or(Error::InvalidState {
            operation: "element_mut",
            state,
        })?;
        (**element)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| Error::ElementType(name.to_string()))
    }

    // ===== Wiring =====

    /// Connect each adjacent pair output → input, upstream first
    pub fn link<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.require_inactive("link")?;
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();

        if let Some(unknown) = names.iter().find(|n| !self.slots.contains_key(n.as_str())) {
            return Err(Error::UnknownElement(unknown.clone()));
        }
        let (Some(head), Some(tail)) = (names.first(), names.last()) else {
            return Err(Error::InvalidConfig("link sequence is empty".to_string()));
        };
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "element '{}' appears more than once in the link sequence",
                    name
                )));
            }
        }

        let capabilities = |name: &str| self.slots.get(name).map(|slot| slot.capabilities);
        let dangling = |name: &str, direction| Error::DanglingPort {
            element: name.to_string(),
            direction,
        };

        if capabilities(head.as_str()).is_some_and(|c| c.has_input) {
            return Err(dangling(head.as_str(), PortDirection::Input));
        }
        if capabilities(tail.as_str()).is_some_and(|c| c.has_output) {
            return Err(dangling(tail.as_str(), PortDirection::Output));
        }
        for pair in names.windows(2) {
            let (upstream, downstream) = (pair[0].as_str(), pair[1].as_str());
            if !capabilities(upstream).is_some_and(|c| c.has_output) {
                return Err(dangling(upstream, PortDirection::Output));
            }
            if !capabilities(downstream).is_some_and(|c| c.has_input) {
                return Err(dangling(downstream, PortDirection::Input));
            }
        }

        info!("Linked {}", names.join(" -> "));
        self.link_order = names;
        Ok(())
    }

    pub fn unlink(&mut self) -> Result<()> {
        self.require_inactive("unlink")?;
        self.link_order.clear();
        Ok(())
    }

    pub fn link_order(&self) -> &[String] {
        &self.link_order
    }

    /// Attach the event bus every element posts to
    pub fn set_listener(&mut self, bus: &EventBus) {
        let sender = bus.sender();
        for slot in self.slots.values() {
            slot.control.set_events(Some(sender.clone()));
        }
        self.events = Some(sender);
        debug!("Event bus attached");
    }

    // ===== Lifecycle =====

    /// Start every linked element, upstream first
    ///
    /// A no-op returning the current state if the pipeline is already running
    /// or paused. After a run has ended, `reset()` is required first.
    pub fn run(&mut self) -> Result<ElementState> {
        match self.state {
            ElementState::Running | ElementState::Paused => {
                debug!("run() on active pipeline ignored");
                return Ok(self.state);
            }
            ElementState::Stopped | ElementState::Error => {
                return Err(Error::InvalidState {
                    operation: "run",
                    state: self.state,
                });
            }
            ElementState::Idle => {}
        }
        if self.link_order.is_empty() {
            return Err(Error::NotLinked);
        }
        if self.settings.port_capacity == 0 {
            return Err(Error::InvalidConfig("port capacity must be non-zero".to_string()));
        }
        for name in &self.link_order {
            if self.slot(name)?.element.is_none() {
                return Err(Error::Worker(format!("element '{}' was lost by a failed worker", name)));
            }
        }

        let mut ios: Vec<PortIo> = self.link_order.iter().map(|_| PortIo::default()).collect();
        for (index, pair) in self.link_order.windows(2).enumerate() {
            let (writer, reader, handle) = port(
                format!("{}->{}", pair[0], pair[1]),
                self.settings.port_capacity,
            );
            ios[index].output = Some(writer);
            ios[index + 1].input = Some(reader);
            if let Some(slot) = self.slots.get_mut(&pair[1]) {
                slot.input_port = Some(handle);
            }
        }

        info!("Starting pipeline: {}", self.link_order.join(" -> "));
        self.state = ElementState::Running;

        let mut spawn_failure = None;
        for (name, io) in self.link_order.iter().zip(ios) {
            let Some(slot) = self.slots.get_mut(name) else {
                continue;
            };
            let Some(element) = slot.element.take() else {
                continue;
            };
            slot.control.clear_stop();
            slot.control.transition(ElementState::Running);

            match worker::spawn(element, io, Arc::clone(&slot.control)) {
                Ok(handle) => slot.worker = Some(handle),
                Err(e) => {
                    error!("Failed to spawn worker for '{}': {}", name, e);
                    slot.control.transition(ElementState::Error);
                    spawn_failure = Some(Error::Worker(format!("spawn '{}': {}", name, e)));
                    break;
                }
            }
        }

        if let Some(err) = spawn_failure {
            self.stop()?;
            return Err(err);
        }
        Ok(self.state)
    }

    /// Suspend every running element before its next step
    pub fn pause(&mut self) -> Result<ElementState> {
        match self.state {
            ElementState::Running => {}
            ElementState::Paused => return Ok(self.state),
            state => {
                return Err(Error::InvalidState {
                    operation: "pause",
                    state,
                })
            }
        }
        for name in &self.link_order {
            if let Some(slot) = self.slots.get(name) {
                slot.control
                    .transition_from(ElementState::Running, ElementState::Paused);
            }
        }
        self.state = ElementState::Paused;
        info!("Pipeline paused");
        Ok(self.state)
    }

    pub fn resume(&mut self) -> Result<ElementState> {
        match self.state {
            ElementState::Paused => {}
            ElementState::Running => return Ok(self.state),
            state => {
                return Err(Error::InvalidState {
                    operation: "resume",
                    state,
                })
            }
        }
        for name in &self.link_order {
            if let Some(slot) = self.slots.get(name) {
                slot.control
                    .transition_from(ElementState::Paused, ElementState::Running);
            }
        }
        self.state = ElementState::Running;
        info!("Pipeline resumed");
        Ok(self.state)
    }

    /// Stop every element, downstream first, and take them back
    ///
    /// Safe to call at any time; a no-op when nothing is running.
    pub fn stop(&mut self) -> Result<ElementState> {
        if !self.state.is_active() {
            debug!("stop() on inactive pipeline ignored");
            return Ok(self.state);
        }
        info!("Stopping pipeline");

        // Flag everything first so no worker mistakes the aborts below for a fault
        for name in self.link_order.iter().rev() {
            if let Some(slot) = self.slots.get(name) {
                slot.control.request_stop();
            }
        }
        for name in self.link_order.iter().rev() {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.control.transition(ElementState::Stopped);
                if let Some(handle) = slot.input_port.take() {
                    handle.abort();
                }
            }
        }

        let mut lost = Vec::new();
        for name in self.link_order.iter().rev() {
            let Some(slot) = self.slots.get_mut(name) else {
                continue;
            };
            if let Some(handle) = slot.worker.take() {
                match handle.join() {
                    Ok(element) => slot.element = Some(element),
                    Err(_) => {
                        error!("Worker for '{}' panicked", name);
                        lost.push(name.clone());
                    }
                }
            }
        }

        self.state = ElementState::Stopped;
        info!("Pipeline stopped");
        if lost.is_empty() {
            Ok(self.state)
        } else {
            Err(Error::Worker(format!("worker panicked: {}", lost.join(", "))))
        }
    }

    /// Block until every linked element has stopped or faulted
    ///
    /// Returns `Error` if any element faulted. Does not join the workers;
    /// call `stop()` afterwards to take the elements back. Blocks for as long
    /// as the pipeline stays paused.
    pub fn wait_for_stop(&self) -> ElementState {
        if !self.state.is_active() {
            return self.state;
        }
        let mut outcome = ElementState::Stopped;
        for name in &self.link_order {
            if let Some(slot) = self.slots.get(name) {
                if slot.control.wait_terminal() == ElementState::Error {
                    outcome = ElementState::Error;
                }
            }
        }
        outcome
    }

    /// Return every element to `Idle` for another run
    pub fn reset(&mut self) -> Result<()> {
        self.require_inactive("reset")?;
        for slot in self.slots.values_mut() {
            if let Some(element) = slot.element.as_mut() {
                element.reset();
            }
            slot.control.clear_stop();
            slot.control.transition(ElementState::Idle);
        }
        self.state = ElementState::Idle;
        debug!("Pipeline reset");
        Ok(())
    }

    /// Stop if needed and tear the graph down
    pub fn terminate(mut self) -> Result<()> {
        let stopped = self.stop();
        self.slots.clear();
        self.link_order.clear();
        info!("Pipeline terminated");
        stopped.map(|_| ())
    }

    /// Fill statistics of every port in the current run, upstream first
    pub fn port_stats(&self) -> Vec<(String, PortStats)> {
        self.link_order
            .iter()
            .filter_map(|name| self.slots.get(name)?.input_port.as_ref())
            .map(|handle| (handle.name().to_string(), handle.stats()))
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineSettings::default())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state.is_active() {
            if let Err(e) = self.stop() {
                warn!("Error stopping pipeline on drop: {}", e);
            }
        }
    }
}
