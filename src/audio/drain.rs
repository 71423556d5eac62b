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
// The drain loop moves samples from a pull-based source into a push-based
// transport through a bounded streaming buffer. Each iteration runs three
// phases to completion, in order:
//
//   1. drain:  peek a sample, offer it to the transport, pop it only once the
//              transport has accepted it; stop at the first zero-byte write.
//   2. refill: when more than `batch_threshold` slots are free, render exactly
//              that many samples into scratch and push them all.
//   3. events: hand due note events to the source.
//
// Nothing here blocks. A full transport just ends the drain phase and is
// retried on the next iteration.
//

use std::time::{Duration, Instant};

use tracing::{debug, info, span, Level};

use super::source::SampleSource;
use super::stream_buffer::StreamingBuffer;
use super::transport::{Transport, TransportError};
use super::{ChannelLayout, FrameEncoder, Sample};
use crate::sequencer::{NoteEvent, Sequencer};

/// How often the run loop reports its statistics.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Fatal drain loop failures. A full transport is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Transport accepted {accepted} bytes of a {frame_bytes} byte frame")]
    PartialFrame { accepted: usize, frame_bytes: usize },

    #[error("Streaming buffer overran during refill: {pushed} of {requested} samples pushed")]
    Overrun { pushed: usize, requested: usize },
}

/// Result of one drain phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    /// Samples the transport accepted and the buffer released.
    pub samples: usize,
    /// True if the phase ended because the transport was full, false if the
    /// buffer ran empty.
    pub sink_full: bool,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    pub drained: Drained,
    /// Samples rendered and pushed; zero when the refill was skipped.
    pub rendered: usize,
    /// Note events delivered to the source.
    pub events: usize,
}

/// Running totals for a drain loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub iterations: u64,
    pub samples_rendered: u64,
    pub samples_written: u64,
    /// Render calls made.
    pub renders: u64,
    /// Iterations whose refill was skipped for lack of free space.
    pub skipped_refills: u64,
    /// Iterations whose drain phase stopped on a full transport.
    pub sink_full_stops: u64,
    /// Iterations whose drain phase emptied the buffer while the transport
    /// still had room. On a real-time sink these are potential dropouts.
    pub empty_outs: u64,
    pub events: u64,
}

/// Offers buffered samples to the transport until it reports itself full or the
/// buffer is empty. A sample is removed from the buffer only after the
/// transport has accepted its whole frame.
pub fn drain_into<T: Transport + ?Sized>(
    buffer: &mut StreamingBuffer,
    encoder: &mut FrameEncoder,
    transport: &mut T,
) -> Result<Drained, DrainError> {
    let mut samples = 0;
    while let Some(sample) = buffer.peek() {
        let frame = encoder.encode(sample);
        let frame_bytes = frame.len();
        let accepted = transport.write(frame, Duration::ZERO)?;
        if accepted == 0 {
            return Ok(Drained {
                samples,
                sink_full: true,
            });
        }
        if accepted != frame_bytes {
            return Err(DrainError::PartialFrame {
                accepted,
                frame_bytes,
            });
        }
        buffer.pop();
        samples += 1;
    }
    Ok(Drained {
        samples,
        sink_full: false,
    })
}

/// Renders into the buffer's free space when that space exceeds
/// `batch_threshold`. The batch is also capped at the scratch length. Returns
/// the number of samples rendered, zero if the refill was skipped.
pub fn refill_from<S: SampleSource + ?Sized>(
    buffer: &mut StreamingBuffer,
    scratch: &mut [Sample],
    source: &mut S,
    batch_threshold: usize,
) -> Result<usize, DrainError> {
    let to_fill = buffer.free_capacity().min(scratch.len());
    if to_fill <= batch_threshold {
        return Ok(0);
    }

    let batch = &mut scratch[..to_fill];
    source.render(batch);
    for (pushed, &sample) in batch.iter().enumerate() {
        if !buffer.push(sample) {
            debug_assert!(false, "streaming buffer rejected a measured free slot");
            return Err(DrainError::Overrun {
                pushed,
                requested: to_fill,
            });
        }
    }
    Ok(to_fill)
}

/// The control loop context: owns the source, the transport, the streaming
/// buffer and the scratch region for the lifetime of the process.
pub struct DrainLoop<S: SampleSource, T: Transport> {
    source: S,
    transport: T,
    buffer: StreamingBuffer,
    /// Render target, as large as the buffer so any refill fits.
    scratch: Box<[Sample]>,
    encoder: FrameEncoder,
    batch_threshold: usize,
    sequencer: Option<Sequencer>,
    stats: DrainStats,
}

impl<S: SampleSource, T: Transport> DrainLoop<S, T> {
    /// Creates a new drain loop. The source and the transport must already be
    /// configured and installed.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(
        source: S,
        transport: T,
        capacity: usize,
        batch_threshold: usize,
        layout: ChannelLayout,
    ) -> DrainLoop<S, T> {
        DrainLoop {
            source,
            transport,
            buffer: StreamingBuffer::new(capacity),
            scratch: vec![0; capacity].into_boxed_slice(),
            encoder: FrameEncoder::new(layout),
            batch_threshold,
            sequencer: None,
            stats: DrainStats::default(),
        }
    }

    /// Drives the event phase from the given sequencer.
    pub fn with_sequencer(mut self, sequencer: Sequencer) -> DrainLoop<S, T> {
        self.sequencer = Some(sequencer);
        self
    }

    /// Runs one drain, refill and event cycle.
    pub fn iterate(&mut self) -> Result<Iteration, DrainError> {
        let drained = drain_into(&mut self.buffer, &mut self.encoder, &mut self.transport)?;
        self.stats.samples_written += drained.samples as u64;
        if drained.sink_full {
            self.stats.sink_full_stops += 1;
        } else if self.stats.samples_rendered > 0 {
            self.stats.empty_outs += 1;
        }

        let rendered = refill_from(
            &mut self.buffer,
            &mut self.scratch,
            &mut self.source,
            self.batch_threshold,
        )?;
        if rendered > 0 {
            self.stats.renders += 1;
            self.stats.samples_rendered += rendered as u64;
        } else {
            self.stats.skipped_refills += 1;
        }

        let events = self.dispatch_events();
        self.stats.events += events as u64;
        self.stats.iterations += 1;

        Ok(Iteration {
            drained,
            rendered,
            events,
        })
    }

    fn dispatch_events(&mut self) -> usize {
        let sequencer = match self.sequencer.as_mut() {
            Some(sequencer) => sequencer,
            None => return 0,
        };

        let mut count = 0;
        for event in sequencer.events(self.stats.samples_rendered) {
            match event {
                NoteEvent::On(note) => {
                    self.source
                        .trigger_note(note.channel, note.pitch, note.velocity)
                }
                NoteEvent::Off { channel, pitch } => self.source.release_note(channel, pitch),
            }
            count += 1;
        }
        count
    }

    /// Iterates until `keep_running` returns false or a fatal error occurs,
    /// starting an iteration at most once per `period`. A fatal error is
    /// returned for the caller to report.
    pub fn run<F>(&mut self, period: Duration, mut keep_running: F) -> Result<DrainStats, DrainError>
    where
        F: FnMut(&DrainStats) -> bool,
    {
        let span = span!(Level::INFO, "drain loop");
        let _enter = span.enter();

        info!(
            transport = %self.transport,
            capacity = self.buffer.capacity(),
            batch_threshold = self.batch_threshold,
            layout = %self.encoder.layout(),
            period = ?period,
            "Drain loop started."
        );

        let mut last_report = Instant::now();
        while keep_running(&self.stats) {
            let started = Instant::now();
            if let Err(e) = self.iterate() {
                self.log_stats();
                return Err(e);
            }

            if last_report.elapsed() >= STATS_INTERVAL {
                self.log_stats();
                last_report = Instant::now();
            }

            let remaining = period.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                spin_sleep::sleep(remaining);
            }
        }

        self.log_stats();
        Ok(self.stats)
    }

    /// Flushes the transport. Call once when the loop is done.
    pub fn finish(&mut self) -> Result<DrainStats, DrainError> {
        self.transport.flush()?;
        debug!(buffered = self.buffer.len(), "Drain loop finished");
        Ok(self.stats)
    }

    fn log_stats(&self) {
        info!(
            iterations = self.stats.iterations,
            rendered = self.stats.samples_rendered,
            written = self.stats.samples_written,
            buffered = self.buffer.len(),
            sink_full_stops = self.stats.sink_full_stops,
            empty_outs = self.stats.empty_outs,
            "Drain loop stats"
        );
    }

    pub fn stats(&self) -> &DrainStats {
        &self.stats
    }

    pub fn buffer(&self) -> &StreamingBuffer {
        &self.buffer
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Gives back the source and the transport. Buffered samples are dropped.
    pub fn into_parts(self) -> (S, T) {
        (self.source, self.transport)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::audio::transport::simulator::I2sSimulator;
    use crate::audio::{from_transport, to_transport};
    use crate::sequencer::Note;
    use crate::testutil::{installed_simulator, RampSource, StingyTransport};

    fn played(sim: &I2sSimulator) -> Vec<Sample> {
        sim.recording()
            .unwrap()
            .iter()
            .map(|&word| from_transport(word))
            .collect()
    }

    #[test]
    fn test_partial_drain_keeps_remainder() {
        // 1000 slots, 800 rendered, the sink takes exactly 300.
        let mut buffer = StreamingBuffer::new(1000);
        let mut encoder = FrameEncoder::new(ChannelLayout::Mono);
        let mut source = RampSource::new();
        let mut sim = installed_simulator(1, 300);

        let mut scratch = [0; 800];
        source.render(&mut scratch);
        for &sample in scratch.iter() {
            assert!(buffer.push(sample));
        }
        assert_eq!(800, buffer.len());

        let drained = drain_into(&mut buffer, &mut encoder, &mut sim).unwrap();
        assert_eq!(
            Drained {
                samples: 300,
                sink_full: true
            },
            drained
        );
        assert_eq!(500, buffer.len());

        sim.advance(300);
        assert_eq!(&scratch[..300], &played(&sim)[..]);
        assert_eq!(Some(scratch[300]), buffer.peek());
    }

    #[test]
    fn test_refill_fills_buffer_exactly() {
        let mut buffer = StreamingBuffer::new(1000);
        let mut scratch = [0; 1000];
        let mut source = RampSource::new();

        assert_eq!(1000, refill_from(&mut buffer, &mut scratch, &mut source, 100).unwrap());
        assert!(buffer.is_full());

        for _ in 0..250 {
            buffer.pop();
        }
        assert_eq!(250, refill_from(&mut buffer, &mut scratch, &mut source, 100).unwrap());
        assert_eq!(1000, buffer.len());
        assert_eq!(2, source.renders());
    }

    #[test]
    fn test_refill_skipped_at_threshold() {
        let mut buffer = StreamingBuffer::new(1000);
        let mut scratch = [0; 1000];
        let mut source = RampSource::new();
        for i in 0..900 {
            buffer.push(i);
        }

        // Exactly 100 free does not exceed a threshold of 100.
        assert_eq!(0, refill_from(&mut buffer, &mut scratch, &mut source, 100).unwrap());
        assert_eq!(0, source.renders());
        assert_eq!(900, buffer.len());

        buffer.pop();
        assert_eq!(101, refill_from(&mut buffer, &mut scratch, &mut source, 100).unwrap());
        assert!(buffer.is_full());
    }

    #[test]
    fn test_refill_capped_by_scratch() {
        let mut buffer = StreamingBuffer::new(100);
        let mut scratch = [0; 30];
        let mut source = RampSource::new();
        assert_eq!(30, refill_from(&mut buffer, &mut scratch, &mut source, 0).unwrap());
        assert_eq!(30, buffer.len());
    }

    #[test]
    fn test_no_loss_with_random_acceptance() {
        let mut rng = StdRng::seed_from_u64(0xd1a);
        let sim = installed_simulator(2, 16);
        let mut pump = DrainLoop::new(RampSource::new(), sim, 200, 20, ChannelLayout::Mono);

        for _ in 0..2000 {
            pump.iterate().unwrap();
            assert!(pump.buffer().len() <= pump.buffer().capacity());
            let frames = rng.gen_range(0..=40);
            pump.transport_mut().advance(frames);
        }

        // Let the sink take everything still buffered, without rendering more.
        let mut encoder = FrameEncoder::new(ChannelLayout::Mono);
        let DrainLoop {
            buffer, transport, ..
        } = &mut pump;
        while !buffer.is_empty() || transport.queued_frames() > 0 {
            drain_into(buffer, &mut encoder, transport).unwrap();
            transport.advance(7);
        }

        let rendered = pump.stats().samples_rendered as usize;
        assert_eq!(RampSource::sequence(rendered), played(pump.transport()));
    }

    #[test]
    fn test_saturates_while_sink_stalled() {
        let sim = installed_simulator(1, 50);
        let mut pump = DrainLoop::new(RampSource::new(), sim, 1000, 10, ChannelLayout::Mono);

        // Fill the buffer, then fill the sink and top the buffer back up.
        assert_eq!(1000, pump.iterate().unwrap().rendered);
        let iteration = pump.iterate().unwrap();
        assert_eq!(50, iteration.drained.samples);
        assert_eq!(50, iteration.rendered);

        for _ in 0..5 {
            let iteration = pump.iterate().unwrap();
            assert_eq!(0, iteration.drained.samples);
            assert!(iteration.drained.sink_full);
            assert_eq!(0, iteration.rendered);
            assert_eq!(1000, pump.buffer().len());
        }
        let stats = *pump.stats();
        assert_eq!(2, stats.renders);
        assert_eq!(1050, stats.samples_rendered);
        assert_eq!(50, stats.samples_written);
        assert_eq!(6, stats.sink_full_stops);
        assert_eq!(5, stats.skipped_refills);

        // The sink resumes and the loop picks up where it left off.
        pump.transport_mut().advance(50);
        let iteration = pump.iterate().unwrap();
        assert_eq!(50, iteration.drained.samples);
        assert_eq!(50, iteration.rendered);
        pump.transport_mut().advance(100);
        assert_eq!(
            RampSource::sequence(100),
            played(pump.transport())
        );
    }

    #[test]
    fn test_fatal_transport_error_keeps_sample() {
        let sim = installed_simulator(1, 4);
        let mut pump = DrainLoop::new(RampSource::new(), sim, 10, 0, ChannelLayout::Mono);
        pump.iterate().unwrap();
        let head = pump.buffer().peek();

        pump.transport_mut().advance(4);
        pump.transport_mut().inject_fault(258);
        assert!(matches!(
            pump.iterate(),
            Err(DrainError::Transport(TransportError::Driver { code: 258, .. }))
        ));
        assert_eq!(head, pump.buffer().peek());
    }

    #[test]
    fn test_partial_frame_is_fatal() {
        let mut buffer = StreamingBuffer::new(4);
        buffer.push(1);
        let mut encoder = FrameEncoder::new(ChannelLayout::Stereo);
        let mut transport = StingyTransport::new(vec![2]);

        assert!(matches!(
            drain_into(&mut buffer, &mut encoder, &mut transport),
            Err(DrainError::PartialFrame {
                accepted: 2,
                frame_bytes: 4
            })
        ));
        assert_eq!(1, buffer.len());
    }

    #[test]
    fn test_stereo_layout_duplicates() {
        let mut config = crate::testutil::transport_config(1, 8);
        config.layout = ChannelLayout::Stereo;
        let mut sim = I2sSimulator::manual().with_recording();
        sim.install(&config).unwrap();

        let mut pump = DrainLoop::new(RampSource::new(), sim, 4, 0, ChannelLayout::Stereo);
        pump.iterate().unwrap();
        pump.iterate().unwrap();
        pump.transport_mut().advance(4);

        let words = pump.transport().recording().unwrap().to_vec();
        let expected: Vec<u16> = RampSource::sequence(4)
            .into_iter()
            .flat_map(|s| [to_transport(s), to_transport(s)])
            .collect();
        assert_eq!(expected, words);
    }

    #[test]
    fn test_event_phase_runs_after_refill() {
        let sim = installed_simulator(1, 10);
        let sequencer = Sequencer::new(
            vec![Note {
                channel: 0,
                pitch: 36,
                velocity: 0.1,
            }],
            0,
            None,
        );
        let mut pump = DrainLoop::new(RampSource::new(), sim, 100, 10, ChannelLayout::Mono)
            .with_sequencer(sequencer);

        let iteration = pump.iterate().unwrap();
        assert_eq!(100, iteration.rendered);
        assert_eq!(1, iteration.events);
        // The note was triggered after the first batch was rendered.
        assert_eq!(&[(100u64, 0u8, 36u8)], pump.source().triggers());

        pump.iterate().unwrap();
        assert_eq!(2, pump.source().triggers().len());
        assert_eq!(2, pump.stats().events);
    }

    #[test]
    fn test_run_stops_on_predicate() {
        let sim = installed_simulator(8, 64);
        let mut pump = DrainLoop::new(RampSource::new(), sim, 100, 10, ChannelLayout::Mono);
        let stats = pump
            .run(Duration::ZERO, |stats| stats.iterations < 3)
            .unwrap();
        assert_eq!(3, stats.iterations);
    }

    #[test]
    fn test_run_halts_on_fatal_error() {
        let sim = installed_simulator(8, 64);
        let mut pump = DrainLoop::new(RampSource::new(), sim, 100, 10, ChannelLayout::Mono);
        pump.iterate().unwrap();
        pump.transport_mut().inject_fault(-1);
        assert!(matches!(
            pump.run(Duration::ZERO, |_| true),
            Err(DrainError::Transport(TransportError::Driver { code: -1, .. }))
        ));
        // The failed iteration is not counted and the buffer is untouched.
        assert_eq!(1, pump.stats().iterations);
        assert_eq!(100, pump.buffer().len());
    }
}
