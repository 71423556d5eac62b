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

//! Pumps synthesized audio into a fixed-rate, non-blocking audio sink.
//!
//! A pull-based [`audio::SampleSource`] renders into a bounded
//! [`audio::StreamingBuffer`], which the [`audio::DrainLoop`] drains into an
//! [`audio::Transport`] one sample at a time, removing a sample only once the
//! transport has accepted it.

pub mod audio;
pub mod config;
pub mod sequencer;
pub mod synth;
#[cfg(test)]
mod testutil;
