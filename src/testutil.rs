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

//! Shared fixtures for unit tests.

use std::{fmt, time::Duration};

use crate::audio::source::{SampleSource, SourceError};
use crate::audio::transport::simulator::I2sSimulator;
use crate::audio::transport::{PinConfig, Transport, TransportConfig, TransportError};
use crate::audio::{ChannelLayout, Sample};

/// A mono transport configuration at 11025 Hz with the given DMA geometry.
pub fn transport_config(dma_buf_count: usize, dma_buf_len: usize) -> TransportConfig {
    TransportConfig {
        sample_rate: 11025,
        layout: ChannelLayout::Mono,
        dma_buf_count,
        dma_buf_len,
        pins: PinConfig {
            bck: 33,
            ws: 32,
            data_out: 27,
        },
        zero_buffers: false,
    }
}

/// A manually paced, recording simulator, already installed.
pub fn installed_simulator(dma_buf_count: usize, dma_buf_len: usize) -> I2sSimulator {
    let mut sim = I2sSimulator::manual().with_recording();
    sim.install(&transport_config(dma_buf_count, dma_buf_len))
        .unwrap();
    sim
}

/// A source that renders a counting ramp, so any lost, duplicated or
/// reordered sample is visible downstream.
pub struct RampSource {
    next: u64,
    renders: usize,
    /// (samples rendered so far, channel, pitch) for each trigger.
    triggers: Vec<(u64, u8, u8)>,
}

impl RampSource {
    pub fn new() -> RampSource {
        RampSource {
            next: 0,
            renders: 0,
            triggers: Vec::new(),
        }
    }

    fn sample(index: u64) -> Sample {
        index as u16 as Sample
    }

    /// The first `count` samples a fresh ramp renders.
    pub fn sequence(count: usize) -> Vec<Sample> {
        (0..count as u64).map(RampSource::sample).collect()
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn triggers(&self) -> &[(u64, u8, u8)] {
        &self.triggers
    }
}

impl SampleSource for RampSource {
    fn set_output(&mut self, _channels: u16, _sample_rate: u32) -> Result<(), SourceError> {
        Ok(())
    }

    fn render(&mut self, dst: &mut [Sample]) {
        for slot in dst.iter_mut() {
            *slot = RampSource::sample(self.next);
            self.next += 1;
        }
        self.renders += 1;
    }

    fn trigger_note(&mut self, channel: u8, pitch: u8, _velocity: f32) {
        self.triggers.push((self.next, channel, pitch));
    }

    fn sample_rate(&self) -> u32 {
        11025
    }
}

/// A transport that accepts the scripted byte counts one write at a time,
/// then everything.
pub struct StingyTransport {
    script: Vec<usize>,
}

impl StingyTransport {
    pub fn new(mut script: Vec<usize>) -> StingyTransport {
        script.reverse();
        StingyTransport { script }
    }
}

impl fmt::Display for StingyTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stingy transport")
    }
}

impl Transport for StingyTransport {
    fn install(&mut self, _config: &TransportConfig) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_pins(&mut self, _pins: &PinConfig) -> Result<(), TransportError> {
        Ok(())
    }

    fn zero_buffers(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        Ok(self
            .script
            .pop()
            .map_or(bytes.len(), |accepted| accepted.min(bytes.len())))
    }
}
