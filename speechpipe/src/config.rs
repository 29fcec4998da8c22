//! speechpipe configuration
//!
//! Loaded from TOML (see [`speechpipe_common::config`] for discovery). Every
//! table and field is optional; compiled defaults describe the deployment
//! graph: 22050 Hz speech, widened to 16-bit stereo, written to a WAV file.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [pipeline]
//! port_capacity = 8192
//! termination = "terminal_stop"
//!
//! [filter]
//! dest_rate = 44100
//! input_widened = false
//!
//! [sink]
//! sample_rate = 44100
//! realtime = true
//! ```

use serde::Deserialize;
use speechpipe_common::config::{load_config, ConfigResolver, LoggingConfig};
use speechpipe_common::AudioFormat;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::pipeline::graph::DEFAULT_PORT_CAPACITY;
use crate::pipeline::sink::DEFAULT_FRAME_CAPACITY;
use crate::pipeline::source::DEFAULT_PULL_CAPACITY;
use crate::pipeline::{PipelineSettings, ResampleConfig, TerminationPolicy};

/// Application name used for the platform config directory
pub const APP_NAME: &str = "speechpipe";

/// `[pipeline]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bytes buffered between neighboring elements
    pub port_capacity: usize,
    /// Pause after an event bus receive fault
    pub listener_retry_ms: u64,
    pub termination: TerminationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            port_capacity: DEFAULT_PORT_CAPACITY,
            listener_retry_ms: 10,
            // A faulted sink never reports Stopped; the binary must not hang on it
            termination: TerminationPolicy::TerminalStopOrError,
        }
    }
}

impl PipelineConfig {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            port_capacity: self.port_capacity,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.listener_retry_ms)
    }
}

/// `[source]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Rate the synthesizer produced the samples at
    pub sample_rate: u32,
    /// Destination bytes requested per pull
    pub pull_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            pull_capacity: DEFAULT_PULL_CAPACITY,
        }
    }
}

/// `[sink]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    /// Frames pulled per drive tick
    pub frame_capacity: usize,
    /// Pace writes to the clock instead of writing as fast as possible
    pub realtime: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            bits_per_sample: 16,
            channels: 2,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            realtime: false,
        }
    }
}

impl SinkConfig {
    pub fn clock(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.bits_per_sample, self.channels)
    }
}

/// `[output]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// WAV file the sink writes
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("speech.wav"),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub filter: ResampleConfig,
    pub sink: SinkConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Resolve, load and validate the configuration
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let source = ConfigResolver::new(APP_NAME).resolve(cli_path);
        let config: AppConfig = load_config(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-table consistency checks
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.port_capacity == 0 {
            return Err(Error::InvalidConfig("pipeline.port_capacity must be non-zero".to_string()));
        }
        if self.source.pull_capacity < 2 {
            return Err(Error::InvalidConfig(
                "source.pull_capacity must hold at least one frame".to_string(),
            ));
        }
        if self.sink.frame_capacity == 0 {
            return Err(Error::InvalidConfig("sink.frame_capacity must be non-zero".to_string()));
        }
        self.filter.validate()?;
        self.sink.clock().validate()?;

        if self.source.sample_rate != self.filter.src_rate {
            return Err(Error::InvalidConfig(format!(
                "source rate {} Hz does not match filter source rate {} Hz",
                self.source.sample_rate, self.filter.src_rate
            )));
        }
        if self.filter.dest_format() != self.sink.clock() {
            return Err(Error::InvalidConfig(format!(
                "filter output {} does not match sink clock {}",
                self.filter.dest_format(),
                self.sink.clock()
            )));
        }
        Ok(())
    }
}
