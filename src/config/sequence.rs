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

use std::time::Duration;

use serde::Deserialize;

use super::{parse_duration, ConfigError};
use crate::sequencer::{Note, Sequencer};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_VELOCITY: f32 = 0.8;

/// A YAML representation of one note in the pattern.
#[derive(Deserialize, Clone, Debug)]
pub struct NoteConfig {
    #[serde(default)]
    channel: u8,
    pitch: u8,
    /// 0.0 to 1.0 (default: 0.8).
    velocity: Option<f32>,
}

impl NoteConfig {
    fn to_note(&self) -> Result<Note, ConfigError> {
        let velocity = self.velocity.unwrap_or(DEFAULT_VELOCITY);
        if !(0.0..=1.0).contains(&velocity) {
            return Err(ConfigError::Invalid(format!(
                "velocity {} for pitch {} is outside 0.0-1.0",
                velocity, self.pitch
            )));
        }
        if self.pitch > 127 {
            return Err(ConfigError::Invalid(format!(
                "pitch {} is outside 0-127",
                self.pitch
            )));
        }
        Ok(Note {
            channel: self.channel,
            pitch: self.pitch,
            velocity,
        })
    }
}

/// A YAML representation of the note sequence played by the event phase.
#[derive(Deserialize, Clone, Debug)]
pub struct Sequence {
    pattern: Vec<NoteConfig>,

    /// Time between notes (default: 500ms). Zero retriggers every iteration.
    interval: Option<String>,

    /// How long each note is held before release. Notes are never released
    /// when unset.
    hold: Option<String>,
}

impl Sequence {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        match &self.interval {
            Some(interval) => parse_duration("sequence.interval", interval),
            None => Ok(DEFAULT_INTERVAL),
        }
    }

    pub fn hold(&self) -> Result<Option<Duration>, ConfigError> {
        self.hold
            .as_ref()
            .map(|hold| parse_duration("sequence.hold", hold))
            .transpose()
    }

    /// Checks the pattern and the timing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern.is_empty() {
            return Err(ConfigError::Invalid(
                "sequence pattern must not be empty".to_string(),
            ));
        }
        for note in &self.pattern {
            note.to_note()?;
        }
        let interval = self.interval()?;
        if let Some(hold) = self.hold()? {
            if !interval.is_zero() && hold > interval {
                return Err(ConfigError::Invalid(format!(
                    "sequence hold {:?} is longer than the interval {:?}",
                    hold, interval
                )));
            }
        }
        Ok(())
    }

    /// Builds the sequencer, converting durations to samples at `sample_rate`.
    pub fn to_sequencer(&self, sample_rate: u32) -> Result<Sequencer, ConfigError> {
        let pattern = self
            .pattern
            .iter()
            .map(NoteConfig::to_note)
            .collect::<Result<Vec<Note>, ConfigError>>()?;
        let to_samples = |d: Duration| (d.as_secs_f64() * sample_rate as f64).round() as u64;
        Ok(Sequencer::new(
            pattern,
            to_samples(self.interval()?),
            self.hold()?.map(to_samples),
        ))
    }
}
