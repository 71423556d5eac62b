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

use serde::Deserialize;

use crate::audio::transport::PinConfig;

const DEFAULT_DMA_BUF_COUNT: usize = 8;
const DEFAULT_DMA_BUF_LEN: usize = 64;
const DEFAULT_BCK_PIN: u8 = 33;
const DEFAULT_WS_PIN: u8 = 32;
const DEFAULT_DATA_OUT_PIN: u8 = 27;

/// Which transport the samples are pumped into.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Simulated I2S bus.
    #[default]
    I2sSim,
    /// Host playback through cpal.
    Cpal,
    /// Capture to a WAV file.
    Wav,
}

/// A YAML representation of the transport pins.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Pins {
    bck: Option<u8>,
    ws: Option<u8>,
    data_out: Option<u8>,
}

impl Pins {
    pub fn to_pin_config(&self) -> PinConfig {
        PinConfig {
            bck: self.bck.unwrap_or(DEFAULT_BCK_PIN),
            ws: self.ws.unwrap_or(DEFAULT_WS_PIN),
            data_out: self.data_out.unwrap_or(DEFAULT_DATA_OUT_PIN),
        }
    }
}

/// A YAML representation of the transport configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Transport {
    /// The transport type (default: i2s-sim).
    #[serde(default)]
    kind: TransportKind,

    /// The cpal output device. Uses the host default when unset.
    device: Option<String>,

    /// The WAV file to write. Required for the wav transport.
    output: Option<PathBuf>,

    /// Number of DMA buffers (default: 8).
    dma_buf_count: Option<usize>,

    /// Frames per DMA buffer (default: 64).
    dma_buf_len: Option<usize>,

    #[serde(default)]
    pins: Pins,

    /// Clear the DMA buffers after install (default: true).
    zero_buffers: Option<bool>,

    /// Pace the simulated bus from the wall clock (default: true).
    realtime: Option<bool>,
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Sets the WAV output path, overriding the file.
    pub fn set_output(&mut self, output: PathBuf) {
        self.output = Some(output);
    }

    pub fn dma_buf_count(&self) -> usize {
        self.dma_buf_count.unwrap_or(DEFAULT_DMA_BUF_COUNT)
    }

    pub fn dma_buf_len(&self) -> usize {
        self.dma_buf_len.unwrap_or(DEFAULT_DMA_BUF_LEN)
    }

    pub fn pins(&self) -> PinConfig {
        self.pins.to_pin_config()
    }

    pub fn zero_buffers(&self) -> bool {
        self.zero_buffers.unwrap_or(true)
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }

    /// Forces manual or real-time pacing of the simulated bus.
    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = Some(realtime);
    }
}
