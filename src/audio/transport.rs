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
use std::{fmt, time::Duration};

use tracing::{info, span, Level};

use crate::config;

use super::ChannelLayout;

pub mod cpal;
pub mod simulator;
pub mod wav;

/// Error types for transport operations. Every variant is fatal for the device:
/// a full transport is reported as `Ok(0)` from [`Transport::write`], never as an error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport driver error (code {code}): {message}")]
    Driver { code: i32, message: String },

    #[error("Transport written before install")]
    NotInstalled,

    #[error("Failed installing transport: {0}")]
    Install(String),

    #[error("Failed setting transport pins: {0}")]
    Pins(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pin assignment for a serial audio bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    /// Serial clock.
    pub bck: u8,
    /// Word select.
    pub ws: u8,
    /// Serial data out.
    pub data_out: u8,
}

/// One-time transport configuration, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    /// Number of DMA buffers.
    pub dma_buf_count: usize,
    /// Frames per DMA buffer.
    pub dma_buf_len: usize,
    pub pins: PinConfig,
    /// Clear the DMA buffers after install.
    pub zero_buffers: bool,
}

impl TransportConfig {
    /// Total number of frames the transport can hold.
    pub fn dma_frames(&self) -> usize {
        self.dma_buf_count * self.dma_buf_len
    }

    /// Total number of bytes the transport can hold.
    pub fn dma_bytes(&self) -> usize {
        self.dma_frames() * self.layout.frame_bytes()
    }
}

/// A push-based audio sink fed at a fixed sample rate.
pub trait Transport: fmt::Display {
    /// Installs the driver. Called once before any write.
    fn install(&mut self, config: &TransportConfig) -> Result<(), TransportError>;

    /// Assigns pins. Transports without pins accept any assignment.
    fn set_pins(&mut self, pins: &PinConfig) -> Result<(), TransportError>;

    /// Fills the transport's internal buffers with silence.
    fn zero_buffers(&mut self) -> Result<(), TransportError>;

    /// Writes as many whole frames from `bytes` as currently fit and returns the
    /// number of bytes accepted. `Ok(0)` means the transport is full. The call
    /// never waits longer than `timeout`; the drain loop always passes zero.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Flushes anything the transport holds in software. Called once at shutdown.
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Transport for Box<dyn Transport> {
    fn install(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        (**self).install(config)
    }

    fn set_pins(&mut self, pins: &PinConfig) -> Result<(), TransportError> {
        (**self).set_pins(pins)
    }

    fn zero_buffers(&mut self) -> Result<(), TransportError> {
        (**self).zero_buffers()
    }

    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).write(bytes, timeout)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }
}

/// Runs the one-time setup sequence: install, assign pins, optionally zero the buffers.
pub fn bring_up<T: Transport + ?Sized>(
    transport: &mut T,
    config: &TransportConfig,
) -> Result<(), TransportError> {
    let span = span!(Level::INFO, "transport bring-up");
    let _enter = span.enter();

    transport.install(config)?;
    transport.set_pins(&config.pins)?;
    if config.zero_buffers {
        transport.zero_buffers()?;
    }

    info!(
        transport = %transport,
        sample_rate = config.sample_rate,
        layout = %config.layout,
        dma_frames = config.dma_frames(),
        "Transport installed."
    );
    Ok(())
}

/// Constructs the transport named by the configuration. The transport still
/// needs [`bring_up`] before use.
pub fn get_transport(config: &config::Pump) -> Result<Box<dyn Transport>, TransportError> {
    let transport = config.transport();
    Ok(match transport.kind() {
        config::TransportKind::I2sSim => Box::new(if transport.realtime() {
            simulator::I2sSimulator::realtime()
        } else {
            simulator::I2sSimulator::manual()
        }),
        config::TransportKind::Cpal => Box::new(cpal::CpalTransport::new(transport.device())),
        config::TransportKind::Wav => {
            let path = transport.output().ok_or_else(|| {
                TransportError::Install("wav transport requires an output path".to_string())
            })?;
            Box::new(wav::WavTransport::new(path))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::transport_config;

    #[test]
    fn test_dma_sizes() {
        let mut config = transport_config(8, 64);
        assert_eq!(512, config.dma_frames());
        assert_eq!(1024, config.dma_bytes());
        config.layout = ChannelLayout::Stereo;
        assert_eq!(2048, config.dma_bytes());
    }

    #[test]
    fn test_bring_up() {
        let mut config = transport_config(2, 4);
        config.zero_buffers = true;
        let mut transport = simulator::I2sSimulator::manual();

        bring_up(&mut transport, &config).unwrap();
        assert_eq!(Some(config.pins), transport.pins());
        assert!(transport.is_installed());
        assert_eq!(8, transport.queued_frames());
    }

    #[test]
    fn test_get_transport() {
        let config = crate::config::Pump::default();
        let transport = get_transport(&config).unwrap();
        assert!(transport.to_string().contains("I2S simulator"));
    }
}
