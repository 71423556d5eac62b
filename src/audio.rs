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
use std::{fmt, str::FromStr};

use serde::Deserialize;

pub mod drain;
pub mod source;
pub mod stream_buffer;
pub mod thread_priority;
pub mod transport;

pub use drain::{DrainError, DrainLoop, DrainStats, Iteration};
pub use source::{SampleSource, SourceError, SynthSource};
pub use stream_buffer::StreamingBuffer;
pub use transport::{Transport, TransportError};

/// One mono PCM amplitude value at the configured sample rate.
pub type Sample = i16;

/// Largest frame the encoder produces, in bytes (two 16-bit words).
pub const MAX_FRAME_BYTES: usize = 4;

/// Converts a signed sample into the unsigned representation the transport expects.
#[inline]
pub fn to_transport(sample: Sample) -> u16 {
    (sample as u16) ^ 0x8000
}

/// Inverse of [`to_transport`]. Only sinks that hand signed PCM onward need this.
#[inline]
pub fn from_transport(word: u16) -> Sample {
    (word ^ 0x8000) as Sample
}

/// How a mono sample is laid out on the transport.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    /// One word per frame.
    #[default]
    Mono,
    /// The sample is duplicated into left and right words.
    Stereo,
}

impl ChannelLayout {
    /// Number of 16-bit words in one frame.
    pub fn channels(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Number of bytes in one frame.
    pub fn frame_bytes(self) -> usize {
        self.channels() as usize * 2
    }
}

impl FromStr for ChannelLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono" | "Mono" => Ok(ChannelLayout::Mono),
            "stereo" | "Stereo" => Ok(ChannelLayout::Stereo),
            _ => Err(format!("Unsupported channel layout: {}", s)),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => write!(f, "mono"),
            ChannelLayout::Stereo => write!(f, "stereo"),
        }
    }
}

/// Encodes samples into transport frames. The frame lives inside the encoder,
/// so encoding never allocates.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    layout: ChannelLayout,
    frame: [u8; MAX_FRAME_BYTES],
}

impl FrameEncoder {
    /// Creates a new encoder for the given layout.
    pub fn new(layout: ChannelLayout) -> FrameEncoder {
        FrameEncoder {
            layout,
            frame: [0; MAX_FRAME_BYTES],
        }
    }

    /// Returns the layout this encoder produces.
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Returns the size of an encoded frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.layout.frame_bytes()
    }

    /// Encodes one sample as little-endian unsigned words and returns the frame.
    pub fn encode(&mut self, sample: Sample) -> &[u8] {
        let word = to_transport(sample).to_le_bytes();
        let len = self.layout.frame_bytes();
        for chunk in self.frame[..len].chunks_exact_mut(2) {
            chunk.copy_from_slice(&word);
        }
        &self.frame[..len]
    }
}

/// Decodes little-endian transport words from raw frame bytes. Trailing odd bytes are ignored.
pub fn decode_words(bytes: &[u8]) -> impl Iterator<Item = u16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_conversion() {
        assert_eq!(0, to_transport(i16::MIN));
        assert_eq!(32768, to_transport(0));
        assert_eq!(32767, to_transport(-1));
        assert_eq!(65535, to_transport(i16::MAX));

        for sample in [i16::MIN, -12345, -1, 0, 1, 4242, i16::MAX] {
            assert_eq!(sample as i32 + 32768, to_transport(sample) as i32);
            assert_eq!(sample, from_transport(to_transport(sample)));
        }
    }

    #[test]
    fn test_mono_frame() {
        let mut encoder = FrameEncoder::new(ChannelLayout::Mono);
        assert_eq!(2, encoder.frame_bytes());
        assert_eq!(&[0x00, 0x80], encoder.encode(0));
        assert_eq!(&[0xff, 0xff], encoder.encode(i16::MAX));
    }

    #[test]
    fn test_stereo_frame_duplicates_sample() {
        let mut encoder = FrameEncoder::new(ChannelLayout::Stereo);
        assert_eq!(4, encoder.frame_bytes());
        let frame = encoder.encode(-2).to_vec();
        let words: Vec<u16> = decode_words(&frame).collect();
        assert_eq!(vec![32766, 32766], words);
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!(ChannelLayout::Mono, "mono".parse().unwrap());
        assert_eq!(ChannelLayout::Stereo, "Stereo".parse().unwrap());
        assert!("quad".parse::<ChannelLayout>().is_err());
        assert_eq!("stereo", ChannelLayout::Stereo.to_string());
    }
}
