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
use crate::synth::{Engine, SynthError};

use super::Sample;

/// Error types for sample source setup. Rendering itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Synth error: {0}")]
    Synth(#[from] SynthError),
}

/// A pull-based renderer of mono samples.
pub trait SampleSource {
    /// Configures the output format once, before the first render.
    fn set_output(&mut self, channels: u16, sample_rate: u32) -> Result<(), SourceError>;

    /// Renders exactly `dst.len()` samples into `dst`, padding with silence when
    /// nothing is playing. Must not allocate.
    fn render(&mut self, dst: &mut [Sample]);

    /// Schedules a note onset, reflected in subsequent renders.
    fn trigger_note(&mut self, channel: u8, pitch: u8, velocity: f32);

    /// Releases a note started by [`SampleSource::trigger_note`].
    fn release_note(&mut self, _channel: u8, _pitch: u8) {}

    /// Get the sample rate of this source
    fn sample_rate(&self) -> u32;
}

/// Blanket implementation for Box<dyn SampleSource> so boxed sources can be
/// used directly with generic code.
impl SampleSource for Box<dyn SampleSource> {
    fn set_output(&mut self, channels: u16, sample_rate: u32) -> Result<(), SourceError> {
        (**self).set_output(channels, sample_rate)
    }

    fn render(&mut self, dst: &mut [Sample]) {
        (**self).render(dst)
    }

    fn trigger_note(&mut self, channel: u8, pitch: u8, velocity: f32) {
        (**self).trigger_note(channel, pitch, velocity)
    }

    fn release_note(&mut self, channel: u8, pitch: u8) {
        (**self).release_note(channel, pitch)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/// Adapts the synthesis engine to [`SampleSource`].
pub struct SynthSource {
    engine: Engine,
}

impl SynthSource {
    pub fn new(engine: Engine) -> SynthSource {
        SynthSource { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl SampleSource for SynthSource {
    fn set_output(&mut self, channels: u16, sample_rate: u32) -> Result<(), SourceError> {
        Ok(self.engine.set_output(channels, sample_rate)?)
    }

    fn render(&mut self, dst: &mut [Sample]) {
        self.engine.render(dst)
    }

    fn trigger_note(&mut self, channel: u8, pitch: u8, velocity: f32) {
        self.engine.note_on(channel, pitch, velocity)
    }

    fn release_note(&mut self, channel: u8, pitch: u8) {
        self.engine.note_off(channel, pitch)
    }

    fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }
}
