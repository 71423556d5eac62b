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

//! Small polyphonic synthesis engine.
//!
//! This module provides:
//! - An instrument bank, embedded at build time or loaded from YAML
//! - Oscillator voices with linear ADSR envelopes
//! - A fixed-size voice pool that renders mono 16-bit PCM on demand

mod bank;
mod engine;
mod voice;

pub use bank::{Bank, Instrument, Waveform};
pub use engine::Engine;

/// Errors raised while loading a bank or configuring the engine. All of them
/// happen at startup; a running engine never fails.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("Instrument bank parse error: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("Instrument bank load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Instrument bank contains no instruments")]
    EmptyBank,

    #[error("Instrument {name} is invalid: {reason}")]
    InvalidInstrument { name: String, reason: String },

    #[error("Engine renders mono only, {0} output channels requested")]
    UnsupportedChannels(u16),

    #[error("Sample rate must be greater than 0")]
    InvalidSampleRate,

    #[error("Engine needs at least one voice")]
    NoVoices,
}
