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
//
// Simulated fixed-rate serial audio bus. Frames queue up in a bounded FIFO that
// stands in for the DMA buffers and are consumed either on demand (tests) or
// from a wall clock at the sample rate.
//

use std::{
    collections::VecDeque,
    fmt,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use super::{PinConfig, Transport, TransportConfig, TransportError};
use crate::audio::{decode_words, to_transport};

/// How the simulated DMA engine consumes frames.
#[derive(Debug, Clone, Copy)]
enum Pacing {
    /// Frames are consumed only by [`I2sSimulator::advance`].
    Manual,
    /// Frames are consumed at the sample rate, measured from the first write.
    RealTime { started: Option<Instant> },
}

/// A simulated I2S transport.
pub struct I2sSimulator {
    config: Option<TransportConfig>,
    pins: Option<PinConfig>,
    pacing: Pacing,
    /// Queued words, waiting for the DMA engine.
    queue: VecDeque<u16>,
    /// Total frames the DMA engine has played.
    played_frames: u64,
    /// Frames the DMA engine wanted but found the queue empty.
    starved_frames: u64,
    /// Every frame period the DMA engine has run for, played or not.
    elapsed_frames: u64,
    /// Everything the DMA engine played, when recording is on.
    recording: Option<Vec<u16>>,
    /// Driver error returned by the next write.
    fault: Option<i32>,
}

impl I2sSimulator {
    /// A simulator whose DMA engine only runs when told to.
    pub fn manual() -> I2sSimulator {
        I2sSimulator::new(Pacing::Manual)
    }

    /// A simulator whose DMA engine runs at the configured sample rate.
    pub fn realtime() -> I2sSimulator {
        I2sSimulator::new(Pacing::RealTime { started: None })
    }

    fn new(pacing: Pacing) -> I2sSimulator {
        I2sSimulator {
            config: None,
            pins: None,
            pacing,
            queue: VecDeque::new(),
            played_frames: 0,
            starved_frames: 0,
            elapsed_frames: 0,
            recording: None,
            fault: None,
        }
    }

    /// Keeps a copy of every word the DMA engine plays.
    pub fn with_recording(mut self) -> I2sSimulator {
        self.recording = Some(Vec::new());
        self
    }

    /// Makes the next write fail with the given driver error code.
    pub fn inject_fault(&mut self, code: i32) {
        self.fault = Some(code);
    }

    pub fn is_installed(&self) -> bool {
        self.config.is_some()
    }

    pub fn pins(&self) -> Option<PinConfig> {
        self.pins
    }

    /// Runs the DMA engine for the given number of frames. Frames the queue
    /// cannot supply are counted as starved.
    pub fn advance(&mut self, frames: usize) {
        let channels = match &self.config {
            Some(config) => config.layout.channels() as usize,
            None => return,
        };

        let available = self.queue.len() / channels;
        let played = available.min(frames);
        let words = played * channels;
        match self.recording.as_mut() {
            Some(recording) => recording.extend(self.queue.drain(..words)),
            None => {
                self.queue.drain(..words);
            }
        }

        self.elapsed_frames += frames as u64;
        self.played_frames += played as u64;
        let starved = (frames - played) as u64;
        if starved > 0 && self.played_frames > 0 {
            self.starved_frames += starved;
        }
    }

    /// Frames waiting in the simulated DMA buffers.
    pub fn queued_frames(&self) -> usize {
        match &self.config {
            Some(config) => self.queue.len() / config.layout.channels() as usize,
            None => 0,
        }
    }

    pub fn played_frames(&self) -> u64 {
        self.played_frames
    }

    /// Frames played as silence because the queue ran dry after playback began.
    pub fn starved_frames(&self) -> u64 {
        self.starved_frames
    }

    /// Words played so far, if recording is on.
    pub fn recording(&self) -> Option<&[u16]> {
        self.recording.as_deref()
    }

    /// Advances the DMA engine to the current wall-clock position.
    fn catch_up(&mut self) {
        let sample_rate = match &self.config {
            Some(config) => config.sample_rate as u64,
            None => return,
        };
        if let Pacing::RealTime { started } = &mut self.pacing {
            let started = *started.get_or_insert_with(Instant::now);
            let due = (started.elapsed().as_secs_f64() * sample_rate as f64) as u64;
            if due > self.elapsed_frames {
                self.advance((due - self.elapsed_frames) as usize);
            }
        }
    }
}

impl fmt::Display for I2sSimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pacing {
            Pacing::Manual => write!(f, "I2S simulator (manual)"),
            Pacing::RealTime { .. } => write!(f, "I2S simulator (real time)"),
        }
    }
}

impl Transport for I2sSimulator {
    fn install(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        if config.sample_rate == 0 || config.dma_frames() == 0 {
            return Err(TransportError::Install(format!(
                "invalid configuration: {} Hz, {} DMA frames",
                config.sample_rate,
                config.dma_frames()
            )));
        }
        self.queue = VecDeque::with_capacity(config.dma_frames() * config.layout.channels() as usize);
        self.config = Some(config.clone());
        debug!(dma_frames = config.dma_frames(), "Simulated I2S driver installed");
        Ok(())
    }

    fn set_pins(&mut self, pins: &PinConfig) -> Result<(), TransportError> {
        if pins.bck == pins.ws || pins.bck == pins.data_out || pins.ws == pins.data_out {
            return Err(TransportError::Pins(format!(
                "pins must be distinct: {:?}",
                pins
            )));
        }
        self.pins = Some(*pins);
        Ok(())
    }

    fn zero_buffers(&mut self) -> Result<(), TransportError> {
        let config = self.config.as_ref().ok_or(TransportError::NotInstalled)?;
        let words = config.dma_frames() * config.layout.channels() as usize;
        self.queue.clear();
        self.queue.resize(words, to_transport(0));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        if let Some(code) = self.fault.take() {
            warn!(code, "Simulated driver fault");
            return Err(TransportError::Driver {
                code,
                message: "injected fault".to_string(),
            });
        }
        self.catch_up();

        let config = self.config.as_ref().ok_or(TransportError::NotInstalled)?;
        let frame_bytes = config.layout.frame_bytes();
        let capacity_words = config.dma_frames() * config.layout.channels() as usize;
        let free_frames = (capacity_words - self.queue.len()) / config.layout.channels() as usize;

        let frames = (bytes.len() / frame_bytes).min(free_frames);
        let accepted = frames * frame_bytes;
        self.queue.extend(decode_words(&bytes[..accepted]));
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ChannelLayout;
    use crate::testutil::transport_config;

    fn installed(count: usize, len: usize) -> I2sSimulator {
        let mut sim = I2sSimulator::manual().with_recording();
        sim.install(&transport_config(count, len)).unwrap();
        sim
    }

    #[test]
    fn test_write_before_install() {
        let mut sim = I2sSimulator::manual();
        assert!(matches!(
            sim.write(&[0, 0], Duration::ZERO),
            Err(TransportError::NotInstalled)
        ));
    }

    #[test]
    fn test_accepts_until_full() {
        let mut sim = installed(1, 3);
        for _ in 0..3 {
            assert_eq!(2, sim.write(&[1, 0], Duration::ZERO).unwrap());
        }
        assert_eq!(0, sim.write(&[1, 0], Duration::ZERO).unwrap());
        assert_eq!(3, sim.queued_frames());

        sim.advance(1);
        assert_eq!(2, sim.write(&[2, 0], Duration::ZERO).unwrap());
        assert_eq!(Some(&[1u16][..]), sim.recording());
    }

    #[test]
    fn test_accepts_whole_frames_only() {
        let mut sim = installed(1, 2);
        // Three bytes is one whole mono frame plus a stray byte.
        assert_eq!(2, sim.write(&[1, 0, 9], Duration::ZERO).unwrap());
        assert_eq!(2, sim.write(&[2, 0, 3, 0], Duration::ZERO).unwrap());
        assert_eq!(2, sim.queued_frames());
    }

    #[test]
    fn test_starvation_counted_after_playback_starts() {
        let mut sim = installed(1, 4);
        sim.advance(10);
        assert_eq!(0, sim.starved_frames());

        sim.write(&[1, 0, 2, 0], Duration::ZERO).unwrap();
        sim.advance(5);
        assert_eq!(2, sim.played_frames());
        assert_eq!(3, sim.starved_frames());
    }

    #[test]
    fn test_stereo_frames() {
        let mut config = transport_config(1, 2);
        config.layout = ChannelLayout::Stereo;
        let mut sim = I2sSimulator::manual().with_recording();
        sim.install(&config).unwrap();

        assert_eq!(4, sim.write(&[1, 0, 1, 0], Duration::ZERO).unwrap());
        assert_eq!(4, sim.write(&[2, 0, 2, 0], Duration::ZERO).unwrap());
        assert_eq!(0, sim.write(&[3, 0, 3, 0], Duration::ZERO).unwrap());
        sim.advance(2);
        assert_eq!(Some(&[1u16, 1, 2, 2][..]), sim.recording());
    }

    #[test]
    fn test_injected_fault() {
        let mut sim = installed(1, 2);
        sim.inject_fault(-1);
        assert!(matches!(
            sim.write(&[1, 0], Duration::ZERO),
            Err(TransportError::Driver { code: -1, .. })
        ));
        assert_eq!(2, sim.write(&[1, 0], Duration::ZERO).unwrap());
    }

    #[test]
    fn test_duplicate_pins_rejected() {
        let mut sim = installed(1, 2);
        let pins = PinConfig {
            bck: 1,
            ws: 1,
            data_out: 2,
        };
        assert!(matches!(sim.set_pins(&pins), Err(TransportError::Pins(_))));
    }

    #[test]
    fn test_realtime_pacing_drains() {
        let mut sim = I2sSimulator::realtime();
        sim.install(&transport_config(1, 4)).unwrap();
        for _ in 0..4 {
            assert_eq!(2, sim.write(&[0, 0], Duration::ZERO).unwrap());
        }
        // 11025 Hz drains four frames in well under 10ms.
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(2, sim.write(&[0, 0], Duration::ZERO).unwrap());
    }
}
