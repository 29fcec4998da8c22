//! Test helper modules for speechpipe integration tests
//!
//! Provides reusable test infrastructure components:
//! - SlowOutput: capture surface that takes time per write
//! - PanickingOutput: surface whose driver panics
//! - Speech buffer builders
//! - Deployment graph builder and event bookkeeping

#![allow(dead_code)]

pub mod outputs;

pub use outputs::{PanickingOutput, SlowOutput};

use speechpipe::output::HardwareOutput;
use speechpipe::pipeline::{EventBus, FormatFilter, Pipeline, ResampleConfig, SinkWriter, SourceAdapter};
use speechpipe::speech::SampleBuffer;
use speechpipe_common::{AudioFormat, ElementId, ElementState, StatusEvent};

/// Sink clock of the deployment graph
pub const DEPLOYMENT_CLOCK: AudioFormat = AudioFormat::new(22050, 16, 2);

/// Samples cycling through every byte value
pub fn ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// Bytes the source adapter produces for `samples`
pub fn widened(samples: &[u8]) -> Vec<u8> {
    samples.iter().flat_map(|&s| [0, s]).collect()
}

/// `src` → `rsp` → `i2s` with the deployment configuration, bus attached
pub fn deployment_pipeline(samples: Vec<u8>, output: impl HardwareOutput) -> (Pipeline, EventBus) {
    graph(samples, ResampleConfig::default(), DEPLOYMENT_CLOCK, output)
}

/// `src` → `rsp` → `i2s` with an explicit filter and sink clock
pub fn graph(
    samples: Vec<u8>,
    filter: ResampleConfig,
    clock: AudioFormat,
    output: impl HardwareOutput,
) -> (Pipeline, EventBus) {
    let rate = filter.src_rate;
    let mut pipeline = Pipeline::default();
    pipeline
        .register("src", SourceAdapter::new(SampleBuffer::from_samples(samples).into_shared(), rate))
        .unwrap();
    pipeline
        .register("rsp", FormatFilter::new(filter).unwrap())
        .unwrap();
    pipeline
        .register("i2s", SinkWriter::new(clock, output).unwrap().with_frame_capacity(1).unwrap())
        .unwrap();
    pipeline.link(&["src", "rsp", "i2s"]).unwrap();

    let bus = EventBus::new();
    pipeline.set_listener(&bus);
    (pipeline, bus)
}

/// Status events posted by `id`, in order
pub fn states_of(events: &[StatusEvent], id: ElementId) -> Vec<ElementState> {
    events
        .iter()
        .filter(|e| e.source == id)
        .filter_map(StatusEvent::reported_state)
        .collect()
}

pub fn count_state(events: &[StatusEvent], id: ElementId, state: ElementState) -> usize {
    states_of(events, id).into_iter().filter(|s| *s == state).count()
}

