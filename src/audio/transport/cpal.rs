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
// Host playback through cpal. The cpal output callback plays the role of the
// DMA engine: it drains a bounded word queue, sized like the DMA buffers, at
// the device's sample rate. Writes never block past their timeout.
//

use std::{
    collections::VecDeque,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{PinConfig, Transport, TransportConfig, TransportError};
use crate::audio::{decode_words, from_transport, to_transport};

/// State shared between the control loop and the cpal callback.
struct Shared {
    /// Interleaved unsigned words waiting to be played.
    queue: Mutex<VecDeque<u16>>,
    /// Maximum number of queued words.
    capacity_words: usize,
    /// Words per frame.
    channels: usize,
    /// First stream error reported by cpal, surfaced on the next write.
    error: Mutex<Option<String>>,
    /// Output samples played as silence because the queue was empty.
    underruns: AtomicU64,
    /// Keeps the output thread (and with it the stream) alive.
    running: AtomicBool,
}

impl Shared {
    /// Queues as many whole frames as fit and returns the bytes accepted.
    fn push_frames(&self, bytes: &[u8]) -> usize {
        let frame_bytes = self.channels * 2;
        let mut queue = self.queue.lock();
        let free_frames = (self.capacity_words - queue.len()) / self.channels;
        let accepted = (bytes.len() / frame_bytes).min(free_frames) * frame_bytes;
        queue.extend(decode_words(&bytes[..accepted]));
        accepted
    }
}

/// Moves queued words into a device buffer, padding with silence. Returns the
/// number of samples padded.
fn fill_output<T>(queue: &mut VecDeque<u16>, data: &mut [T]) -> u64
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    let mut short = 0;
    for out in data.iter_mut() {
        *out = match queue.pop_front() {
            Some(word) => T::from_sample(from_transport(word)),
            None => {
                short += 1;
                T::EQUILIBRIUM
            }
        };
    }
    short
}

/// Builds an output stream in the device's native sample type.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let error_shared = shared.clone();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let short = fill_output(&mut shared.queue.lock(), data);
            if short > 0 {
                shared.underruns.fetch_add(short, Ordering::Relaxed);
            }
        },
        move |err| {
            error!("CPAL output stream error: {}", err);
            error_shared.error.lock().get_or_insert(err.to_string());
        },
        None,
    )
}

/// Host audio output driven through cpal.
pub struct CpalTransport {
    /// Device to open; the host default when unset.
    device_name: Option<String>,
    shared: Option<Arc<Shared>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl CpalTransport {
    pub fn new(device_name: Option<&str>) -> CpalTransport {
        CpalTransport {
            device_name: device_name.map(str::to_string),
            shared: None,
            output_thread: None,
        }
    }

    /// Output samples the device has played as silence so far.
    pub fn underruns(&self) -> u64 {
        self.shared
            .as_ref()
            .map(|shared| shared.underruns.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn find_device(&self) -> Result<cpal::Device, TransportError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| TransportError::Install("no default output device".to_string())),
            Some(name) => host
                .output_devices()
                .map_err(|e| TransportError::Install(e.to_string()))?
                .find(|device| device.name().map(|n| n.trim() == name).unwrap_or(false))
                .ok_or_else(|| TransportError::Install(format!("no device found with name {}", name))),
        }
    }
}

/// Lists the names of the output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            names.push(format!("{} ({})", device.name()?, host_id.name()));
        }
    }
    names.sort();
    Ok(names)
}

impl fmt::Display for CpalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (cpal)",
            self.device_name.as_deref().unwrap_or("default device")
        )
    }
}

impl Transport for CpalTransport {
    fn install(&mut self, config: &TransportConfig) -> Result<(), TransportError> {
        let device = self.find_device()?;
        let channels = config.layout.channels() as usize;
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(config.dma_frames() * channels)),
            capacity_words: config.dma_frames() * channels,
            channels,
            error: Mutex::new(None),
            underruns: AtomicU64::new(0),
            running: AtomicBool::new(true),
        });

        let stream_config = cpal::StreamConfig {
            channels: config.layout.channels(),
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let sample_format = device
            .default_output_config()
            .map_err(|e| TransportError::Install(e.to_string()))?
            .sample_format();

        // The stream is created and kept alive on its own thread; the result of
        // starting it is reported back before install returns.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let thread_shared = shared.clone();
        let output_thread = thread::spawn(move || {
            let stream_shared = thread_shared.clone();
            let stream = match sample_format {
                cpal::SampleFormat::I16 => {
                    build_stream::<i16>(&device, &stream_config, stream_shared)
                }
                cpal::SampleFormat::I32 => {
                    build_stream::<i32>(&device, &stream_config, stream_shared)
                }
                cpal::SampleFormat::F32 => {
                    build_stream::<f32>(&device, &stream_config, stream_shared)
                }
                format => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", format)));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create stream: {}", e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while thread_shared.running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                let _ = output_thread.join();
                return Err(TransportError::Install(message));
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(TransportError::Install(
                    "output thread exited during start-up".to_string(),
                ));
            }
        }

        info!(
            device = %self,
            format = ?sample_format,
            words = shared.capacity_words,
            "CPAL output stream started"
        );
        self.shared = Some(shared);
        self.output_thread = Some(output_thread);
        Ok(())
    }

    fn set_pins(&mut self, pins: &PinConfig) -> Result<(), TransportError> {
        warn!(?pins, "Pin assignment does not apply to host audio, ignoring");
        Ok(())
    }

    fn zero_buffers(&mut self) -> Result<(), TransportError> {
        let shared = self.shared.as_ref().ok_or(TransportError::NotInstalled)?;
        let mut queue = shared.queue.lock();
        queue.clear();
        queue.resize(shared.capacity_words, to_transport(0));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let shared = self.shared.as_ref().ok_or(TransportError::NotInstalled)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = shared.error.lock().take() {
                return Err(TransportError::Driver { code: -1, message });
            }
            let accepted = shared.push_frames(bytes);
            if accepted > 0 || Instant::now() >= deadline {
                return Ok(accepted);
            }
            spin_sleep::sleep(Duration::from_micros(100));
        }
    }
}

impl Drop for CpalTransport {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.running.store(false, Ordering::Relaxed);
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(capacity_words: usize, channels: usize) -> Shared {
        Shared {
            queue: Mutex::new(VecDeque::new()),
            capacity_words,
            channels,
            error: Mutex::new(None),
            underruns: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }

    #[test]
    fn test_push_frames_bounded() {
        let shared = shared(4, 2);
        assert_eq!(4, shared.push_frames(&[1, 0, 1, 0]));
        // Only one more stereo frame fits, the second is refused.
        assert_eq!(4, shared.push_frames(&[2, 0, 2, 0, 3, 0, 3, 0]));
        assert_eq!(0, shared.push_frames(&[4, 0, 4, 0]));
        assert_eq!(vec![1u16, 1, 2, 2], shared.queue.lock().iter().copied().collect::<Vec<_>>());
    }

    #[test]
    fn test_fill_output_native_formats() {
        let words = [to_transport(-5), to_transport(7)];

        let mut queue: VecDeque<u16> = words.iter().copied().collect();
        let mut data = [1i16; 3];
        assert_eq!(1, fill_output(&mut queue, &mut data));
        assert_eq!([-5, 7, 0], data);
        assert!(queue.is_empty());

        let mut queue: VecDeque<u16> = [to_transport(i16::MIN), to_transport(16384)]
            .into_iter()
            .collect();
        let mut data = [1.0f32; 2];
        assert_eq!(0, fill_output(&mut queue, &mut data));
        assert_eq!([-1.0, 0.5], data);
    }

    #[test]
    fn test_write_before_install() {
        let mut transport = CpalTransport::new(None);
        assert!(matches!(
            transport.write(&[0, 0], Duration::ZERO),
            Err(TransportError::NotInstalled)
        ));
        assert_eq!(0, transport.underruns());
    }
}
