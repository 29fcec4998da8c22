//! One worker thread per running element

use speechpipe_common::ElementState;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::control::ElementControl;
use super::element::{Element, PortIo, Step};
use crate::error::ElementFault;

enum RunOutcome {
    /// Input exhausted and everything flushed
    Finished,
    /// `stop()` was requested
    Stopped,
    Faulted(ElementFault),
}

/// Move `element` onto its own thread; the handle returns it when the run ends
pub(crate) fn spawn(
    mut element: Box<dyn Element>,
    mut io: PortIo,
    control: Arc<ElementControl>,
) -> std::io::Result<JoinHandle<Box<dyn Element>>> {
    thread::Builder::new()
        .name(format!("element-{}", control.name()))
        .spawn(move || {
            run_element(element.as_mut(), &mut io, &control);
            // Ports close here, waking any neighbor still blocked on them
            drop(io);
            element
        })
}

fn run_element(element: &mut dyn Element, io: &mut PortIo, control: &ElementControl) {
    let ctx = control.context();

    // A panicking element (or the output it drives) must still end in Error
    let outcome = catch_unwind(AssertUnwindSafe(|| match element.open(&ctx) {
        Ok(()) => drive(&mut *element, &mut *io, control),
        Err(fault) => RunOutcome::Faulted(fault),
    }))
    .unwrap_or_else(|payload| RunOutcome::Faulted(ElementFault::Panicked(panic_message(payload.as_ref()))));

    let outcome = match catch_unwind(AssertUnwindSafe(|| element.close())) {
        Ok(()) => outcome,
        Err(payload) => match outcome {
            RunOutcome::Faulted(fault) => RunOutcome::Faulted(fault),
            _ => RunOutcome::Faulted(ElementFault::Panicked(panic_message(payload.as_ref()))),
        },
    };

    match outcome {
        RunOutcome::Finished => {
            io.finish_output();
            if control.finish_run(ElementState::Stopped) {
                info!(element = control.name(), "Element finished");
            }
        }
        RunOutcome::Stopped => {
            debug!(element = control.name(), "Element stopped on request");
        }
        RunOutcome::Faulted(ElementFault::Interrupted) if control.stop_requested() => {
            debug!(element = control.name(), "Element interrupted by stop");
        }
        RunOutcome::Faulted(fault) => {
            if control.finish_run(ElementState::Error) {
                error!(element = control.name(), "Element fault: {}", fault);
            } else {
                warn!(element = control.name(), "Fault after stop request: {}", fault);
            }
        }
    }
}

fn drive(element: &mut dyn Element, io: &mut PortIo, control: &ElementControl) -> RunOutcome {
    loop {
        if !control.checkpoint() {
            return RunOutcome::Stopped;
        }
        match element.step(io) {
            Ok(Step::Continue) => {}
            Ok(Step::Finished) => return RunOutcome::Finished,
            Err(fault) => return RunOutcome::Faulted(fault),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
