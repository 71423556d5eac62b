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
// Offline transport that captures what it is given into a 16-bit WAV file.
// Without a frame limit it never reports itself full, so a drain loop feeding
// it runs as fast as the source can render. With one it reports itself full
// once the limit is reached.
//

use std::{
    fmt,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Duration,
};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use super::{PinConfig, Transport, TransportConfig, TransportError};
use crate::audio::{decode_words, from_transport};

pub struct WavTransport {
    path: PathBuf,
    frame_bytes: usize,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
    /// Frames after which the transport reports itself full.
    frame_limit: Option<u64>,
}

impl WavTransport {
    pub fn new(path: &Path) -> WavTransport {
        WavTransport {
            path: path.to_path_buf(),
            frame_bytes: 2,
            writer: None,
            frames_written: 0,
            frame_limit: None,
        }
    }

    /// Stops accepting frames once `frames` have been written.
    pub fn with_frame_limit(mut self, frames: u64) -> WavTransport {
        self.frame_limit = Some(frames);
        self
    }

    /// True once the frame limit has been reached.
    pub fn is_complete(&self) -> bool {
        self.frame_limit
            .is_some_and(|limit| self.frames_written >= limit)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

fn wav_error(e: hound::Error) -> TransportError {
    match e {
        hound::Error::IoError(e) => TransportError::Io(e),
        e => TransportError::Driver {
            code: -1,
            message: e.to_string(),
        },
    }
}

impl fmt::Display for WavTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WAV capture ({})", self.path.display())
    }
}

impl Transport for WavTransport {
    fn install(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        let spec = WavSpec {
            channels: config.layout.channels(),
            sample_rate: config.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&self.path, spec)
            .map_err(|e| TransportError::Install(format!("{}: {}", self.path.display(), e)))?;
        self.writer = Some(writer);
        self.frame_bytes = config.layout.frame_bytes();
        Ok(())
    }

    fn set_pins(&mut self, _pins: &PinConfig) -> Result<(), TransportError> {
        Ok(())
    }

    fn zero_buffers(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotInstalled)?;
        let mut frames = (bytes.len() / self.frame_bytes) as u64;
        if let Some(limit) = self.frame_limit {
            frames = frames.min(limit.saturating_sub(self.frames_written));
        }
        let accepted = frames as usize * self.frame_bytes;
        for word in decode_words(&bytes[..accepted]) {
            writer.write_sample(from_transport(word)).map_err(wav_error)?;
        }
        self.frames_written += frames;
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(wav_error)?;
            info!(
                path = %self.path.display(),
                frames = self.frames_written,
                "WAV capture finalized."
            );
        }
        Ok(())
    }
}
