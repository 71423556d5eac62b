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

//! Instrument bank definitions.
//!
//! The default bank is compiled into the binary. A bank can also be loaded
//! from a YAML file at startup.

use std::path::Path;
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::debug;

use super::SynthError;

/// The bank compiled into the binary.
const EMBEDDED_BANK: &str = include_str!("../../assets/bank.yaml");

/// Default master gain applied to the mix.
const DEFAULT_BANK_GAIN: f32 = 0.5;

/// Default per-instrument gain.
const DEFAULT_INSTRUMENT_GAIN: f32 = 1.0;

/// Oscillator shapes available to instruments.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
    Noise,
}

/// A YAML representation of an instrument.
#[derive(Deserialize, Debug, Clone)]
struct InstrumentDefinition {
    name: String,
    waveform: Waveform,
    attack: Option<String>,
    decay: Option<String>,
    sustain: Option<f32>,
    release: Option<String>,
    gain: Option<f32>,
}

/// A YAML representation of a bank.
#[derive(Deserialize, Debug, Clone)]
struct BankDefinition {
    gain: Option<f32>,
    instruments: Vec<InstrumentDefinition>,
}

/// A validated instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    name: String,
    waveform: Waveform,
    attack: Duration,
    decay: Duration,
    sustain: f32,
    release: Duration,
    gain: f32,
}

impl Instrument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn attack(&self) -> Duration {
        self.attack
    }

    pub fn decay(&self) -> Duration {
        self.decay
    }

    /// Sustain level, 0.0 to 1.0.
    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    pub fn release(&self) -> Duration {
        self.release
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn from_definition(definition: InstrumentDefinition) -> Result<Instrument, SynthError> {
        let name = definition.name;
        let invalid = |reason: String| SynthError::InvalidInstrument {
            name: name.clone(),
            reason,
        };

        let sustain = definition.sustain.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&sustain) {
            return Err(invalid(format!("sustain {} is outside 0.0-1.0", sustain)));
        }
        let gain = definition.gain.unwrap_or(DEFAULT_INSTRUMENT_GAIN);
        if !(0.0..=1.0).contains(&gain) {
            return Err(invalid(format!("gain {} is outside 0.0-1.0", gain)));
        }

        Ok(Instrument {
            attack: parse_duration(&definition.attack).map_err(&invalid)?,
            decay: parse_duration(&definition.decay).map_err(&invalid)?,
            release: parse_duration(&definition.release).map_err(&invalid)?,
            waveform: definition.waveform,
            sustain,
            gain,
            name: name.clone(),
        })
    }
}

fn parse_duration(value: &Option<String>) -> Result<Duration, String> {
    match value {
        Some(value) => DurationString::from_string(value.clone())
            .map(|duration| duration.into())
            .map_err(|e| format!("bad duration {}: {}", value, e)),
        None => Ok(Duration::ZERO),
    }
}

/// A validated instrument bank. Channel N plays instrument N.
#[derive(Debug, Clone)]
pub struct Bank {
    gain: f32,
    instruments: Vec<Instrument>,
}

impl Bank {
    /// Returns the bank compiled into the binary.
    pub fn embedded() -> Result<Bank, SynthError> {
        Bank::from_yaml(EMBEDDED_BANK)
    }

    /// Parses a bank from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Bank, SynthError> {
        Bank::from_definition(serde_yml::from_str::<BankDefinition>(yaml)?)
    }

    /// Loads a bank from a YAML file.
    pub fn from_path(path: &Path) -> Result<Bank, SynthError> {
        let definition = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<BankDefinition>()?;
        Bank::from_definition(definition)
    }

    fn from_definition(definition: BankDefinition) -> Result<Bank, SynthError> {
        if definition.instruments.is_empty() {
            return Err(SynthError::EmptyBank);
        }
        let gain = definition.gain.unwrap_or(DEFAULT_BANK_GAIN);
        if !(0.0..=1.0).contains(&gain) {
            return Err(SynthError::InvalidInstrument {
                name: "<bank>".to_string(),
                reason: format!("gain {} is outside 0.0-1.0", gain),
            });
        }

        let instruments = definition
            .instruments
            .into_iter()
            .map(Instrument::from_definition)
            .collect::<Result<Vec<Instrument>, SynthError>>()?;
        debug!(instruments = instruments.len(), gain, "Loaded instrument bank");

        Ok(Bank { gain, instruments })
    }

    /// Master gain applied to the mix.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Returns the instrument assigned to the given channel.
    pub fn instrument(&self, channel: u8) -> Option<&Instrument> {
        self.instruments.get(channel as usize)
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_embedded_bank_is_valid() {
        let bank = Bank::embedded().expect("embedded bank should parse");
        assert!(!bank.instruments().is_empty());
        let bass = bank.instrument(0).expect("channel 0 should have an instrument");
        assert_eq!("bass", bass.name());
        assert_eq!(Waveform::Saw, bass.waveform());
        assert_eq!(Duration::from_millis(4), bass.attack());
        assert!(bank.instrument(200).is_none());
    }

    #[test]
    fn test_defaults() {
        let bank = Bank::from_yaml(
            r#"
            instruments:
              - name: plain
                waveform: sine
            "#,
        )
        .unwrap();
        let plain = bank.instrument(0).unwrap();
        assert_eq!(Duration::ZERO, plain.attack());
        assert_eq!(Duration::ZERO, plain.release());
        assert_eq!(1.0, plain.sustain());
        assert_eq!(DEFAULT_INSTRUMENT_GAIN, plain.gain());
        assert_eq!(DEFAULT_BANK_GAIN, bank.gain());
    }

    #[test]
    fn test_empty_bank_rejected() {
        assert!(matches!(
            Bank::from_yaml("instruments: []"),
            Err(SynthError::EmptyBank)
        ));
    }

    #[test]
    fn test_invalid_instruments_rejected() {
        let bad_sustain = Bank::from_yaml(
            r#"
            instruments:
              - name: loud
                waveform: saw
                sustain: 1.5
            "#,
        );
        assert!(matches!(
            bad_sustain,
            Err(SynthError::InvalidInstrument { ref name, .. }) if name == "loud"
        ));

        let bad_duration = Bank::from_yaml(
            r#"
            instruments:
              - name: slow
                waveform: saw
                attack: forever
            "#,
        );
        assert!(matches!(
            bad_duration,
            Err(SynthError::InvalidInstrument { .. })
        ));

        assert!(matches!(
            Bank::from_yaml("instruments: [{name: x, waveform: kazoo}]"),
            Err(SynthError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "gain: 0.25\ninstruments:\n  - name: blip\n    waveform: square\n    decay: 20ms\n    sustain: 0.0"
        )
        .unwrap();

        let bank = Bank::from_path(file.path()).unwrap();
        assert_eq!(0.25, bank.gain());
        assert_eq!("blip", bank.instrument(0).unwrap().name());
        assert_eq!(Duration::from_millis(20), bank.instrument(0).unwrap().decay());
    }
}
