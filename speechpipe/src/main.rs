//! speechpipe - Main entry point
//!
//! Plays a pre-synthesized unsigned 8-bit speech file through the deployment
//! graph (`src` → `rsp` → `i2s`) into a WAV file, then tears the graph down
//! once the sink reports completion.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use speechpipe::config::AppConfig;
use speechpipe::output::{HardwareOutput, PacedOutput, WavOutput};
use speechpipe::pipeline::{EventBus, FormatFilter, Listener, Pipeline, SinkWriter, SourceAdapter};
use speechpipe::speech::SampleBuffer;
use speechpipe_common::ElementState;

/// Command-line arguments for speechpipe
#[derive(Parser, Debug)]
#[command(name = "speechpipe")]
#[command(about = "Stream synthesized speech through the output pipeline")]
#[command(version)]
struct Args {
    /// Configuration file (overrides SPEECHPIPE_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Headerless unsigned 8-bit PCM produced by the synthesizer
    #[arg(short, long)]
    input: PathBuf,

    /// WAV file to write (overrides [output] path)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = args.output {
        config.output.path = path;
    }

    // Initialize tracing: console by default, or the configured log file
    let (console_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(tracing_subscriber::fmt::layer()), None),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Starting speechpipe");
    info!("Input: {}", args.input.display());

    let buffer = SampleBuffer::from_raw_file(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut pipeline = build_pipeline(&config, buffer).context("Failed to build pipeline")?;
    let mut bus = EventBus::new();
    pipeline.set_listener(&bus);

    let listener = Listener::new(pipeline.element_id("i2s")?)
        .with_policy(config.pipeline.termination)
        .with_retry_delay(config.pipeline.retry_delay());

    pipeline.run().context("Failed to start pipeline")?;

    let listening = tokio::task::spawn_blocking(move || listener.run(&mut bus));

    tokio::select! {
        result = listening => {
            let event = result.context("Listener task failed")?;
            if event.reported_state() == Some(ElementState::Error) {
                warn!("Sink faulted, unwinding pipeline");
            }
        },
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
        },
    }

    pipeline.terminate().context("Failed to stop pipeline")?;
    info!("Wrote {}", config.output.path.display());
    Ok(())
}

/// Source adapter → format filter → sink writer, linked and ready to run
fn build_pipeline(config: &AppConfig, buffer: SampleBuffer) -> speechpipe::Result<Pipeline> {
    let mut pipeline = Pipeline::new(config.pipeline.settings());

    let source = SourceAdapter::new(buffer.into_shared(), config.source.sample_rate)
        .with_pull_capacity(config.source.pull_capacity);
    let filter = FormatFilter::new(config.filter.clone())?;

    let wav = WavOutput::new(&config.output.path);
    let output: Box<dyn HardwareOutput> = if config.sink.realtime {
        Box::new(PacedOutput::new(wav))
    } else {
        Box::new(wav)
    };
    let sink = SinkWriter::new(config.sink.clock(), output)?.with_frame_capacity(config.sink.frame_capacity)?;

    pipeline.register("src", source)?;
    pipeline.register("rsp", filter)?;
    pipeline.register("i2s", sink)?;
    pipeline.link(&["src", "rsp", "i2s"])?;
    Ok(pipeline)
}
