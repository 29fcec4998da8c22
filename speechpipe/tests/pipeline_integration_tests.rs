//! Pipeline integration tests
//!
//! Full graphs (source adapter → format filter → sink writer) running on
//! their worker threads, observed through the event bus.

mod helpers;

use helpers::{
    count_state, deployment_pipeline, graph, ramp, states_of, widened, PanickingOutput, SlowOutput, DEPLOYMENT_CLOCK,
};
use speechpipe::output::{CaptureOutput, WavOutput};
use speechpipe::pipeline::{Listener, ResampleConfig, TerminationPolicy};
use speechpipe::Error;
use speechpipe_common::{AudioFormat, Command, ElementState, Payload};
use std::thread;
use std::time::Duration;

// ============================================================================
// Data flow
// ============================================================================

/// **Given:** the deployment graph with a 1000-sample speech buffer
/// **When:** the pipeline runs to completion
/// **Then:** the sink receives every sample widened to `[0, sample]` and the
/// listener ends on the sink's single `Stopped` event
#[test]
fn test_deployment_graph_end_to_end() {
    let samples = ramp(1000);
    let capture = CaptureOutput::new();
    let (mut pipeline, mut bus) = deployment_pipeline(samples.clone(), capture.clone());
    let sink = pipeline.element_id("i2s").unwrap();

    assert_eq!(pipeline.run().unwrap(), ElementState::Running);

    let terminal = Listener::new(sink).run(&mut bus);
    assert!(terminal.is_status_from(sink, ElementState::Stopped));

    pipeline.stop().unwrap();
    assert_eq!(capture.bytes(), widened(&samples));
    assert_eq!(capture.format(), Some(DEPLOYMENT_CLOCK));
    assert!(capture.is_finished());

    // Nothing after the terminal event repeats it
    let rest = bus.drain();
    assert_eq!(count_state(&rest, sink, ElementState::Stopped), 0);
}

#[test]
fn test_every_transition_posted_exactly_once() {
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(300), CaptureOutput::new());
    let ids: Vec<_> = ["src", "rsp", "i2s"]
        .iter()
        .map(|name| pipeline.element_id(name).unwrap())
        .collect();

    pipeline.run().unwrap();
    assert_eq!(pipeline.wait_for_stop(), ElementState::Stopped);
    pipeline.stop().unwrap();

    let events = bus.drain();
    for id in ids {
        assert_eq!(
            states_of(&events, id),
            vec![ElementState::Running, ElementState::Stopped]
        );
    }
}

#[test]
fn test_elements_start_upstream_first() {
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(10), CaptureOutput::new());
    let names: Vec<_> = ["src", "rsp", "i2s"]
        .iter()
        .map(|name| pipeline.element_id(name).unwrap())
        .collect();

    pipeline.run().unwrap();
    pipeline.wait_for_stop();
    pipeline.stop().unwrap();

    let started: Vec<_> = bus
        .drain()
        .into_iter()
        .filter(|e| e.reported_state() == Some(ElementState::Running))
        .map(|e| e.source)
        .collect();
    assert_eq!(started, names);
}

#[test]
fn test_stream_info_reported() {
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(10), CaptureOutput::new());
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    pipeline.wait_for_stop();
    pipeline.stop().unwrap();

    let info: Vec<_> = bus
        .drain()
        .into_iter()
        .filter(|e| e.source == sink && e.command == Command::ReportStreamInfo)
        .collect();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].payload, Payload::StreamInfo { format: DEPLOYMENT_CLOCK });
}

#[test]
fn test_empty_buffer_still_completes() {
    let capture = CaptureOutput::new();
    let (mut pipeline, mut bus) = deployment_pipeline(Vec::new(), capture.clone());
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    let terminal = Listener::new(sink).run(&mut bus);
    assert_eq!(terminal.reported_state(), Some(ElementState::Stopped));

    pipeline.stop().unwrap();
    assert!(capture.bytes().is_empty());
    assert!(capture.is_finished());
}

#[test]
fn test_resampled_run_into_wav() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("speech.wav");

    let filter = ResampleConfig {
        dest_rate: 44100,
        input_widened: false,
        chunk_frames: 256,
        ..ResampleConfig::default()
    };
    let clock = AudioFormat::new(44100, 16, 2);
    let (mut pipeline, mut bus) = graph(vec![200; 2205], filter, clock, WavOutput::new(&path));
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    Listener::new(sink).run(&mut bus);
    pipeline.terminate().unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    // 2205 frames at 22050 Hz doubled
    assert_eq!(reader.duration(), 4410);
}

// ============================================================================
// Lifecycle
// ============================================================================

/// **Given:** a running pipeline
/// **When:** `run()` is called again without `stop()`
/// **Then:** it returns `Running` and posts no second start event
#[test]
fn test_run_is_idempotent() {
    let output = SlowOutput::new(Duration::from_millis(1));
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(200), output);

    assert_eq!(pipeline.run().unwrap(), ElementState::Running);
    assert_eq!(pipeline.run().unwrap(), ElementState::Running);
    assert_eq!(pipeline.state(), ElementState::Running);
    pipeline.stop().unwrap();

    let events = bus.drain();
    for name in ["src", "rsp", "i2s"] {
        let id = pipeline.element_id(name).unwrap();
        assert_eq!(count_state(&events, id, ElementState::Running), 1, "{}", name);
    }
}

/// **Given:** a pipeline still streaming
/// **When:** `stop()` is called
/// **Then:** elements stop downstream first, each reporting `Stopped` once
#[test]
fn test_stop_mid_run_in_reverse_order() {
    let output = SlowOutput::new(Duration::from_millis(2));
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(20_000), output);
    let ids: Vec<_> = ["i2s", "rsp", "src"]
        .iter()
        .map(|name| pipeline.element_id(name).unwrap())
        .collect();

    pipeline.run().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(pipeline.stop().unwrap(), ElementState::Stopped);

    let events = bus.drain();
    let stopped: Vec<_> = events
        .iter()
        .filter(|e| e.reported_state() == Some(ElementState::Stopped))
        .map(|e| e.source)
        .collect();
    assert_eq!(stopped, ids);
    assert!(events
        .iter()
        .all(|e| e.reported_state() != Some(ElementState::Error)));

    for name in ["src", "rsp", "i2s"] {
        assert_eq!(pipeline.element_state(name).unwrap(), ElementState::Stopped);
    }
}

#[test]
fn test_pause_holds_output_until_resume() {
    let output = SlowOutput::new(Duration::from_millis(2));
    let capture = output.capture();
    let samples = ramp(400);
    let (mut pipeline, _bus) = deployment_pipeline(samples.clone(), output);

    pipeline.run().unwrap();
    assert_eq!(pipeline.pause().unwrap(), ElementState::Paused);
    assert_eq!(pipeline.element_state("i2s").unwrap(), ElementState::Paused);

    // Let any in-flight step settle
    thread::sleep(Duration::from_millis(50));
    let held = capture.bytes().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(capture.bytes().len(), held);
    assert!(held < samples.len() * 2);

    assert_eq!(pipeline.resume().unwrap(), ElementState::Running);
    assert_eq!(pipeline.wait_for_stop(), ElementState::Stopped);
    pipeline.stop().unwrap();
    assert_eq!(capture.bytes(), widened(&samples));
}

#[test]
fn test_stop_while_paused() {
    let output = SlowOutput::new(Duration::from_millis(2));
    let (mut pipeline, _bus) = deployment_pipeline(ramp(5_000), output);

    pipeline.run().unwrap();
    pipeline.pause().unwrap();
    assert_eq!(pipeline.stop().unwrap(), ElementState::Stopped);
    assert_eq!(pipeline.element_state("src").unwrap(), ElementState::Stopped);
}

#[test]
fn test_reset_and_run_again() {
    let capture = CaptureOutput::new();
    let samples = ramp(64);
    let (mut pipeline, _bus) = deployment_pipeline(samples.clone(), capture.clone());

    pipeline.run().unwrap();
    pipeline.wait_for_stop();
    pipeline.stop().unwrap();
    pipeline.reset().unwrap();

    pipeline.run().unwrap();
    assert_eq!(pipeline.wait_for_stop(), ElementState::Stopped);
    pipeline.stop().unwrap();
    // Capture is reconfigured on open, so it holds exactly the second run
    assert_eq!(capture.bytes(), widened(&samples));
}

// ============================================================================
// Faults
// ============================================================================

/// **Given:** a link sequence naming an unregistered element
/// **When:** linking
/// **Then:** `UnknownElement`, and nothing has started
#[test]
fn test_unknown_element_fails_before_anything_runs() {
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(10), CaptureOutput::new());
    // Drop the valid link so only the failing one is in play
    pipeline.unlink().unwrap();

    let err = pipeline.link(&["src", "resampler", "i2s"]).unwrap_err();
    assert!(matches!(err, Error::UnknownElement(ref name) if name == "resampler"));
    assert!(err.is_configuration_error());

    assert!(matches!(pipeline.run(), Err(Error::NotLinked)));
    for name in ["src", "rsp", "i2s"] {
        assert_eq!(pipeline.element_state(name).unwrap(), ElementState::Idle);
    }
    assert!(bus.try_listen().is_none());
}

/// **Given:** a sink whose hardware fails mid-stream
/// **When:** the pipeline runs
/// **Then:** the sink reports `Error` (not retried), the default listener
/// policy does not treat it as terminal, and `stop()` then ends the run
#[test]
fn test_hardware_fault_surfaces_as_error_event() {
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(1000), CaptureOutput::failing_after(8));
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    assert_eq!(pipeline.wait_for_stop(), ElementState::Error);
    assert_eq!(pipeline.element_state("i2s").unwrap(), ElementState::Error);

    let listener = Listener::new(sink);
    let events = bus.drain();
    assert_eq!(count_state(&events, sink, ElementState::Error), 1);
    assert!(!events.iter().any(|e| listener.is_terminal_event(e)));

    pipeline.stop().unwrap();
    let terminal = listener.run(&mut bus);
    assert!(terminal.is_status_from(sink, ElementState::Stopped));
}

/// **Given:** a sink whose output driver panics on its first write
/// **When:** the pipeline runs
/// **Then:** the panic is contained: the sink reports `Error`, the run ends
/// instead of hanging, and `stop()` gets every element back
#[test]
fn test_panicking_output_surfaces_as_error_event() {
    let (mut pipeline, mut bus) = deployment_pipeline(vec![1; 100], PanickingOutput);
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    assert_eq!(pipeline.wait_for_stop(), ElementState::Error);

    let events = bus.drain();
    assert_eq!(count_state(&events, sink, ElementState::Error), 1);

    assert_eq!(pipeline.stop().unwrap(), ElementState::Stopped);
    let terminal = Listener::new(sink).run(&mut bus);
    assert!(terminal.is_status_from(sink, ElementState::Stopped));
}

#[test]
fn test_error_policy_ends_listener_on_panic() {
    let (mut pipeline, mut bus) = deployment_pipeline(vec![1; 100], PanickingOutput);
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    let terminal = Listener::new(sink)
        .with_policy(TerminationPolicy::TerminalStopOrError)
        .run(&mut bus);
    assert!(terminal.is_status_from(sink, ElementState::Error));
    pipeline.terminate().unwrap();
}

#[test]
fn test_error_policy_ends_listener_on_fault() {
    let (mut pipeline, mut bus) = deployment_pipeline(ramp(1000), CaptureOutput::failing_after(8));
    let sink = pipeline.element_id("i2s").unwrap();

    pipeline.run().unwrap();
    let terminal = Listener::new(sink)
        .with_policy(TerminationPolicy::TerminalStopOrError)
        .run(&mut bus);
    assert_eq!(terminal.reported_state(), Some(ElementState::Error));
    pipeline.terminate().unwrap();
}

#[test]
fn test_spawned_listener_sees_completion() {
    let (mut pipeline, bus) = deployment_pipeline(ramp(100), CaptureOutput::new());
    let sink = pipeline.element_id("i2s").unwrap();

    let handle = Listener::new(sink).spawn(bus).unwrap();
    pipeline.run().unwrap();

    let (terminal, _bus) = handle.join().unwrap();
    assert_eq!(terminal.source_name, "i2s");
    pipeline.terminate().unwrap();
}
