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

//! Polyphonic engine that mixes a fixed pool of voices into mono PCM.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::bank::Bank;
use super::voice::Voice;
use super::SynthError;

/// Default sample rate until set_output is called.
const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Seed for the noise oscillator, fixed so renders are reproducible.
const NOISE_SEED: u64 = 0x5eed;

/// The synthesis engine. All memory is allocated in [`Engine::new`]; rendering
/// and note handling never allocate.
pub struct Engine {
    bank: Bank,
    voices: Vec<Voice>,
    sample_rate: u32,
    /// Monotonic trigger counter.
    triggers: u64,
    rng: StdRng,
}

impl Engine {
    /// Creates a new engine with a fixed number of voices.
    pub fn new(bank: Bank, max_voices: usize) -> Result<Engine, SynthError> {
        if max_voices == 0 {
            return Err(SynthError::NoVoices);
        }
        Ok(Engine {
            bank,
            voices: vec![Voice::default(); max_voices],
            sample_rate: DEFAULT_SAMPLE_RATE,
            triggers: 0,
            rng: StdRng::seed_from_u64(NOISE_SEED),
        })
    }

    /// Configures the output format. Only mono output is produced.
    pub fn set_output(&mut self, channels: u16, sample_rate: u32) -> Result<(), SynthError> {
        if channels != 1 {
            return Err(SynthError::UnsupportedChannels(channels));
        }
        if sample_rate == 0 {
            return Err(SynthError::InvalidSampleRate);
        }
        self.sample_rate = sample_rate;
        info!(
            sample_rate,
            voices = self.voices.len(),
            instruments = self.bank.instruments().len(),
            "Synth output configured."
        );
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    /// Starts a note. A note already sounding on the same channel and pitch is
    /// retriggered; otherwise a free voice is used, or the oldest voice is stolen.
    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: f32) {
        let instrument = match self.bank.instrument(channel) {
            Some(instrument) => instrument,
            None => {
                debug!(channel, pitch, "No instrument for channel, ignoring note");
                return;
            }
        };

        let index = self
            .voices
            .iter()
            .position(|voice| voice.matches(channel, pitch))
            .or_else(|| self.voices.iter().position(|voice| !voice.is_active()))
            .unwrap_or_else(|| {
                let (oldest, _) = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.started())
                    .unwrap_or((0, &self.voices[0]));
                debug!(channel, pitch, "Voice limit reached, stealing oldest");
                oldest
            });

        self.triggers += 1;
        self.voices[index].start(
            instrument,
            channel,
            pitch,
            velocity,
            self.sample_rate,
            self.triggers,
        );
    }

    /// Releases every held voice playing the given note.
    pub fn note_off(&mut self, channel: u8, pitch: u8) {
        self.voices
            .iter_mut()
            .filter(|voice| voice.matches(channel, pitch))
            .for_each(Voice::release);
    }

    /// Number of voices currently sounding.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }

    /// Renders exactly `dst.len()` mono samples. Silence when no voice is active.
    pub fn render(&mut self, dst: &mut [i16]) {
        if self.active_voices() == 0 {
            dst.fill(0);
            return;
        }

        let gain = self.bank.gain();
        for out in dst.iter_mut() {
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|voice| voice.is_active()) {
                mix += voice.next(&mut self.rng);
            }
            *out = ((mix * gain).clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        }
    }
}
