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

//! A single oscillator voice with a linear ADSR envelope.

use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::Rng;

use super::bank::{Instrument, Waveform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Converts a MIDI pitch into a frequency in Hz (A4 = 69 = 440 Hz).
pub fn pitch_to_hz(pitch: u8) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Number of samples covered by a duration, never less than one.
fn samples_for(duration: std::time::Duration, sample_rate: u32) -> f32 {
    (duration.as_secs_f32() * sample_rate as f32).max(1.0)
}

/// One sounding note.
#[derive(Debug, Clone)]
pub struct Voice {
    stage: Stage,
    channel: u8,
    pitch: u8,
    /// Oscillator phase in cycles, 0.0 to 1.0.
    phase: f32,
    /// Phase advance per sample.
    phase_increment: f32,
    waveform: Waveform,
    /// Velocity scaled by instrument gain.
    amplitude: f32,
    level: f32,
    attack_step: f32,
    decay_step: f32,
    sustain: f32,
    release_samples: f32,
    release_step: f32,
    /// Trigger order, used to find the oldest voice to steal.
    started: u64,
}

impl Default for Voice {
    fn default() -> Self {
        Voice {
            stage: Stage::Idle,
            channel: 0,
            pitch: 0,
            phase: 0.0,
            phase_increment: 0.0,
            waveform: Waveform::Sine,
            amplitude: 0.0,
            level: 0.0,
            attack_step: 0.0,
            decay_step: 0.0,
            sustain: 0.0,
            release_samples: 1.0,
            release_step: 0.0,
            started: 0,
        }
    }
}

impl Voice {
    /// Starts (or restarts) this voice for the given note.
    pub fn start(
        &mut self,
        instrument: &Instrument,
        channel: u8,
        pitch: u8,
        velocity: f32,
        sample_rate: u32,
        started: u64,
    ) {
        self.stage = Stage::Attack;
        self.channel = channel;
        self.pitch = pitch;
        self.phase = 0.0;
        self.phase_increment = pitch_to_hz(pitch) / sample_rate as f32;
        self.waveform = instrument.waveform();
        self.amplitude = velocity.clamp(0.0, 1.0) * instrument.gain();
        self.level = 0.0;
        self.attack_step = 1.0 / samples_for(instrument.attack(), sample_rate);
        self.sustain = instrument.sustain();
        self.decay_step = (1.0 - self.sustain) / samples_for(instrument.decay(), sample_rate);
        self.release_samples = samples_for(instrument.release(), sample_rate);
        self.release_step = 0.0;
        self.started = started;
    }

    /// Moves the voice into its release stage.
    pub fn release(&mut self) {
        if self.is_active() && self.stage != Stage::Release {
            self.stage = Stage::Release;
            self.release_step = self.level / self.release_samples;
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// True while the note has not been released.
    pub fn is_held(&self) -> bool {
        matches!(self.stage, Stage::Attack | Stage::Decay | Stage::Sustain)
    }

    pub fn matches(&self, channel: u8, pitch: u8) -> bool {
        self.is_active() && self.channel == channel && self.pitch == pitch
    }

    pub fn started(&self) -> u64 {
        self.started
    }

    /// Produces the next sample, -1.0 to 1.0 before mixing.
    pub fn next(&mut self, rng: &mut StdRng) -> f32 {
        let envelope = self.advance_envelope();
        if !self.is_active() {
            return 0.0;
        }

        let value = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * self.phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (self.phase - 0.5).abs(),
            Waveform::Noise => rng.gen_range(-1.0..=1.0),
        };

        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        value * envelope * self.amplitude
    }

    fn advance_envelope(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = if self.sustain > 0.0 {
                        Stage::Sustain
                    } else {
                        Stage::Idle
                    };
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}
