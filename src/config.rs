// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::warn;

use crate::audio::transport::TransportConfig;
use crate::audio::ChannelLayout;
use crate::sequencer::Sequencer;

mod buffer;
mod error;
mod sequence;
mod transport;

pub use self::buffer::Buffer;
pub use self::error::ConfigError;
pub use self::sequence::{NoteConfig, Sequence};
pub use self::transport::{Pins, Transport, TransportKind};

const DEFAULT_SAMPLE_RATE: u32 = 11025;
const DEFAULT_LOOP_PERIOD: Duration = Duration::from_millis(10);
const DEFAULT_MAX_VOICES: usize = 16;

/// Parses a duration string such as `10ms` or `1s500ms`.
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            field,
            message: e.to_string(),
        })
}

/// A YAML representation of the pump configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Pump {
    /// Sample rate in Hz shared by the source and the transport (default: 11025).
    sample_rate: Option<u32>,

    /// Frame layout at the transport (default: mono).
    channels: Option<ChannelLayout>,

    /// Time between drain loop iterations (default: 10ms).
    loop_period: Option<String>,

    /// Size of the synth voice pool (default: 16).
    max_voices: Option<usize>,

    /// Instrument bank file. The embedded bank is used when unset.
    bank: Option<PathBuf>,

    #[serde(default)]
    buffer: Buffer,

    #[serde(default)]
    transport: Transport,

    /// Notes played by the event phase. No events are issued when unset.
    sequence: Option<Sequence>,
}

impl Pump {
    /// Loads the pump configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Pump, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Pump>()?)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn layout(&self) -> ChannelLayout {
        self.channels.unwrap_or_default()
    }

    pub fn loop_period(&self) -> Result<Duration, ConfigError> {
        match &self.loop_period {
            Some(period) => parse_duration("loop_period", period),
            None => Ok(DEFAULT_LOOP_PERIOD),
        }
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    pub fn bank(&self) -> Option<&Path> {
        self.bank.as_deref()
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    /// The one-time transport configuration.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            sample_rate: self.sample_rate(),
            layout: self.layout(),
            dma_buf_count: self.transport.dma_buf_count(),
            dma_buf_len: self.transport.dma_buf_len(),
            pins: self.transport.pins(),
            zero_buffers: self.transport.zero_buffers(),
        }
    }

    /// The event phase sequencer, if a sequence is configured.
    pub fn sequencer(&self) -> Result<Option<Sequencer>, ConfigError> {
        self.sequence
            .as_ref()
            .map(|sequence| sequence.to_sequencer(self.sample_rate()))
            .transpose()
    }

    /// Rejects configurations the drain loop cannot run with. Warns about
    /// buffers too small to cover one loop period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid(
                "sample_rate must be non-zero".to_string(),
            ));
        }
        let capacity = self.buffer.capacity();
        if capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer capacity must be non-zero".to_string(),
            ));
        }
        let batch_threshold = self.buffer.batch_threshold();
        if batch_threshold >= capacity {
            return Err(ConfigError::Invalid(format!(
                "batch threshold {} must be below the buffer capacity {}",
                batch_threshold, capacity
            )));
        }
        if self.max_voices() == 0 {
            return Err(ConfigError::Invalid(
                "max_voices must be non-zero".to_string(),
            ));
        }
        if self.transport.dma_buf_count() == 0 || self.transport.dma_buf_len() == 0 {
            return Err(ConfigError::Invalid(
                "DMA buffer count and length must be non-zero".to_string(),
            ));
        }
        if let Some(sequence) = &self.sequence {
            sequence.validate()?;
        }

        let loop_period = self.loop_period()?;
        let per_period = loop_period.as_secs_f64() * self.sample_rate() as f64;
        if (capacity as f64) < per_period / 2.0 {
            warn!(
                capacity,
                loop_period = ?loop_period,
                samples_per_period = per_period,
                "Streaming buffer is small for the loop period, expect dropouts"
            );
        }
        if let Some(step) = self.short_sequence_step()? {
            warn!(
                step,
                batch = capacity - batch_threshold,
                "Sequence steps are shorter than a refill batch, some notes will not sound"
            );
        }
        Ok(())
    }

    /// Checks the configured transport can be constructed. Only needed when
    /// the transport comes from the configuration.
    pub fn validate_transport(&self) -> Result<(), ConfigError> {
        if self.transport.kind() == TransportKind::Wav && self.transport.output().is_none() {
            return Err(ConfigError::Invalid(
                "the wav transport requires an output path".to_string(),
            ));
        }
        Ok(())
    }

    /// Events are dispatched once per iteration, after a refill of up to
    /// `capacity - batch_threshold` samples. Returns the sequence interval or
    /// hold, in samples, when it is shorter than that. An interval of zero
    /// retriggers once per iteration and is not reported.
    pub fn short_sequence_step(&self) -> Result<Option<u64>, ConfigError> {
        let sequence = match &self.sequence {
            Some(sequence) => sequence,
            None => return Ok(None),
        };
        let interval = sequence.interval()?;
        if interval.is_zero() {
            return Ok(None);
        }

        let batch = self
            .buffer
            .capacity()
            .saturating_sub(self.buffer.batch_threshold()) as u64;
        let to_samples = |d: Duration| (d.as_secs_f64() * self.sample_rate() as f64).round() as u64;
        let shortest = match sequence.hold()? {
            Some(hold) => to_samples(interval).min(to_samples(hold)),
            None => to_samples(interval),
        };
        Ok((shortest < batch).then_some(shortest))
    }
}
