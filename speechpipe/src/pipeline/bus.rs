//! Event bus and listener loop
//!
//! Every element posts [`StatusEvent`]s onto one unbounded multi-producer
//! single-consumer channel. Events from one producer arrive in the order they
//! were posted; nothing is dropped or duplicated.
//!
//! The [`Listener`] drains the bus until the designated terminal element
//! reports `Stopped`. Receive faults are logged and the loop keeps waiting.

use speechpipe_common::{ElementId, ElementState, StatusEvent};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::ChannelFault;

/// Producer handle; cheap to clone, one per element
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl EventSender {
    /// Post an event; returns false if the bus is gone
    pub fn post(&self, event: StatusEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!("Event bus closed, dropping {}", event);
                false
            }
        }
    }
}

/// The single ordered event channel a pipeline reports to
#[derive(Debug)]
pub struct EventBus {
    // Held so the receive side never observes disconnection while the bus lives
    tx: mpsc::UnboundedSender<StatusEvent>,
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    /// Block until the next event
    ///
    /// Must not be called from inside an async runtime; run the listener on
    /// its own thread or in `spawn_blocking` there.
    pub fn listen(&mut self) -> Result<StatusEvent, ChannelFault> {
        self.rx.blocking_recv().ok_or(ChannelFault::Disconnected)
    }

    /// Next event if one is queued
    pub fn try_listen(&mut self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Every queued event, in order
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_listen() {
            events.push(event);
        }
        events
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking receive side the listener loop reads from
pub trait EventSource {
    fn next_event(&mut self) -> Result<StatusEvent, ChannelFault>;
}

impl EventSource for EventBus {
    fn next_event(&mut self) -> Result<StatusEvent, ChannelFault> {
        self.listen()
    }
}

/// When the listener loop ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Only on the terminal element's `Stopped` status
    #[default]
    TerminalStop,
    /// Also on the terminal element's `Error` status
    TerminalStopOrError,
}

/// Listener loop that waits for the terminal element to finish
#[derive(Debug, Clone)]
pub struct Listener {
    terminal: ElementId,
    policy: TerminationPolicy,
    retry_delay: Duration,
}

impl Listener {
    pub fn new(terminal: ElementId) -> Self {
        Self {
            terminal,
            policy: TerminationPolicy::default(),
            retry_delay: Duration::from_millis(10),
        }
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause after a receive fault before trying again
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn terminal(&self) -> ElementId {
        self.terminal
    }

    /// Whether `event` ends the loop
    pub fn is_terminal_event(&self, event: &StatusEvent) -> bool {
        if event.is_status_from(self.terminal, ElementState::Stopped) {
            return true;
        }
        self.policy == TerminationPolicy::TerminalStopOrError
            && event.is_status_from(self.terminal, ElementState::Error)
    }

    /// Drain `source` until the terminal event; returns that event
    pub fn run<S: EventSource + ?Sized>(&self, source: &mut S) -> StatusEvent {
        loop {
            match source.next_event() {
                Ok(event) => {
                    if self.is_terminal_event(&event) {
                        info!("Terminal element reported {}, listener done", event);
                        return event;
                    }
                    debug!(source_kind = ?event.source_kind, command = ?event.command, "Event: {}", event);
                }
                Err(fault) => {
                    error!("Event interface error: {}", fault);
                    if !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
    }

    /// Run the loop on its own thread
    pub fn spawn<S>(self, mut source: S) -> std::io::Result<JoinHandle<(StatusEvent, S)>>
    where
        S: EventSource + Send + 'static,
    {
        thread::Builder::new()
            .name("event-listener".to_string())
            .spawn(move || {
                let event = self.run(&mut source);
                (event, source)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechpipe_common::{AudioFormat, SourceKind};
    use std::collections::VecDeque;

    /// Scripted source: replays results, then reports disconnection forever
    struct ScriptedSource {
        script: VecDeque<Result<StatusEvent, ChannelFault>>,
        calls: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<StatusEvent, ChannelFault>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn next_event(&mut self) -> Result<StatusEvent, ChannelFault> {
            self.calls += 1;
            self.script
                .pop_front()
                .unwrap_or(Err(ChannelFault::Disconnected))
        }
    }

    #[test]
    fn test_bus_preserves_order() {
        let mut bus = EventBus::new();
        let sender = bus.sender();
        let id = ElementId::new();

        sender.post(StatusEvent::status(id, "a", ElementState::Running));
        sender.post(StatusEvent::status(id, "a", ElementState::Stopped));

        assert_eq!(bus.listen().unwrap().reported_state(), Some(ElementState::Running));
        assert_eq!(bus.listen().unwrap().reported_state(), Some(ElementState::Stopped));
        assert!(bus.try_listen().is_none());
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let mut bus = EventBus::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sender = bus.sender();
                thread::spawn(move || {
                    let id = ElementId::new();
                    for _ in 0..100 {
                        sender.post(StatusEvent::status(id, "p", ElementState::Running));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bus.drain().len(), 400);
    }

    #[test]
    fn test_listener_ignores_non_terminal_events() {
        let sink = ElementId::new();
        let filter = ElementId::new();
        let mut source = ScriptedSource::new(vec![
            Ok(StatusEvent::status(filter, "rsp", ElementState::Stopped)),
            Ok(StatusEvent::status(filter, "rsp", ElementState::Error)),
            Ok(StatusEvent::status(sink, "i2s", ElementState::Running)),
            Ok(StatusEvent::stream_info(sink, "i2s", AudioFormat::new(22050, 16, 2))),
            Ok(StatusEvent::status(sink, "i2s", ElementState::Stopped)),
        ]);

        let event = Listener::new(sink).run(&mut source);
        assert!(event.is_status_from(sink, ElementState::Stopped));
        assert_eq!(source.calls, 5);
    }

    #[test]
    fn test_listener_retries_after_channel_fault() {
        let sink = ElementId::new();
        let mut source = ScriptedSource::new(vec![
            Err(ChannelFault::Receive("spurious".to_string())),
            Err(ChannelFault::Disconnected),
            Ok(StatusEvent::status(sink, "i2s", ElementState::Stopped)),
        ]);

        let listener = Listener::new(sink).with_retry_delay(Duration::ZERO);
        let event = listener.run(&mut source);
        assert_eq!(event.reported_state(), Some(ElementState::Stopped));
        assert_eq!(source.calls, 3);
    }

    #[test]
    fn test_generic_source_does_not_terminate() {
        let sink = ElementId::new();
        let mut spoofed = StatusEvent::status(sink, "app", ElementState::Stopped);
        spoofed.source_kind = SourceKind::Generic;

        let listener = Listener::new(sink);
        assert!(!listener.is_terminal_event(&spoofed));
    }

    #[test]
    fn test_error_policy() {
        let sink = ElementId::new();
        let error = StatusEvent::status(sink, "i2s", ElementState::Error);

        assert!(!Listener::new(sink).is_terminal_event(&error));
        assert!(Listener::new(sink)
            .with_policy(TerminationPolicy::TerminalStopOrError)
            .is_terminal_event(&error));
    }

    #[test]
    fn test_spawned_listener_returns_bus() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let sink = ElementId::new();

        let handle = Listener::new(sink).spawn(bus).unwrap();
        sender.post(StatusEvent::status(sink, "i2s", ElementState::Running));
        sender.post(StatusEvent::status(sink, "i2s", ElementState::Stopped));

        let (event, mut bus) = handle.join().unwrap();
        assert_eq!(event.reported_state(), Some(ElementState::Stopped));
        assert!(bus.try_listen().is_none());
    }
}
