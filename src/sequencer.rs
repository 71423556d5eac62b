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

//! Note events for the event phase of the drain loop.
//!
//! A [`Sequencer`] cycles through a pattern of notes on the rendered-sample
//! clock, so the same configuration always produces the same audio no matter
//! how the host loop is scheduled.

use tracing::debug;

/// A note to trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub channel: u8,
    pub pitch: u8,
    /// 0.0 to 1.0.
    pub velocity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    On(Note),
    Off { channel: u8, pitch: u8 },
}

pub struct Sequencer {
    pattern: Vec<Note>,
    /// Samples between notes. Zero retriggers once per loop iteration.
    interval: u64,
    /// Samples a note is held before release, if it is released at all.
    hold: Option<u64>,
    step: usize,
    next_on: u64,
    pending_off: Option<(u64, u8, u8)>,
}

impl Sequencer {
    /// Creates a new sequencer. `hold` longer than a non-zero `interval` is
    /// clamped to the interval.
    pub fn new(pattern: Vec<Note>, interval: u64, hold: Option<u64>) -> Sequencer {
        let hold = match (interval, hold) {
            (0, _) => hold.map(|_| 0),
            (interval, Some(hold)) => Some(hold.min(interval)),
            (_, None) => None,
        };
        Sequencer {
            pattern,
            interval,
            hold,
            step: 0,
            next_on: 0,
            pending_off: None,
        }
    }

    /// Returns the events due at `clock`, in order. Drain the iterator fully.
    pub fn events(&mut self, clock: u64) -> Events<'_> {
        Events {
            sequencer: self,
            clock,
            fired: false,
        }
    }

    fn next_note(&mut self, at: u64) -> Option<Note> {
        let note = *self.pattern.get(self.step)?;
        self.step = (self.step + 1) % self.pattern.len();
        if let Some(hold) = self.hold {
            self.pending_off = Some((at + hold, note.channel, note.pitch));
        }
        debug!(
            channel = note.channel,
            pitch = note.pitch,
            at,
            "Sequencer note"
        );
        Some(note)
    }
}

/// Iterator over the events due in one loop iteration.
pub struct Events<'a> {
    sequencer: &'a mut Sequencer,
    clock: u64,
    fired: bool,
}

impl Iterator for Events<'_> {
    type Item = NoteEvent;

    fn next(&mut self) -> Option<NoteEvent> {
        let sequencer = &mut *self.sequencer;

        if let Some((due, channel, pitch)) = sequencer.pending_off {
            if due <= self.clock {
                sequencer.pending_off = None;
                return Some(NoteEvent::Off { channel, pitch });
            }
        }

        if sequencer.interval == 0 {
            if self.fired {
                return None;
            }
            self.fired = true;
            return sequencer.next_note(self.clock).map(NoteEvent::On);
        }

        if sequencer.next_on > self.clock {
            return None;
        }
        let at = sequencer.next_on;
        sequencer.next_on += sequencer.interval;
        sequencer.next_note(at).map(NoteEvent::On)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8) -> Note {
        Note {
            channel: 0,
            pitch,
            velocity: 0.5,
        }
    }

    #[test]
    fn test_cycles_pattern_on_interval() {
        let mut sequencer = Sequencer::new(vec![note(36), note(43)], 100, None);

        let events: Vec<NoteEvent> = sequencer.events(0).collect();
        assert_eq!(vec![NoteEvent::On(note(36))], events);
        assert_eq!(0, sequencer.events(99).count());

        let events: Vec<NoteEvent> = sequencer.events(250).collect();
        assert_eq!(vec![NoteEvent::On(note(43)), NoteEvent::On(note(36))], events);
    }

    #[test]
    fn test_hold_releases_before_next_note() {
        let mut sequencer = Sequencer::new(vec![note(60)], 100, Some(40));
        assert_eq!(1, sequencer.events(0).count());
        assert_eq!(0, sequencer.events(39).count());

        let events: Vec<NoteEvent> = sequencer.events(40).collect();
        assert_eq!(
            vec![NoteEvent::Off {
                channel: 0,
                pitch: 60
            }],
            events
        );

        let events: Vec<NoteEvent> = sequencer.events(240).collect();
        assert_eq!(
            vec![
                NoteEvent::On(note(60)),
                NoteEvent::Off {
                    channel: 0,
                    pitch: 60
                },
                NoteEvent::On(note(60)),
                NoteEvent::Off {
                    channel: 0,
                    pitch: 60
                },
            ],
            events
        );
    }

    #[test]
    fn test_zero_interval_fires_once_per_iteration() {
        let mut sequencer = Sequencer::new(vec![note(36)], 0, None);
        assert_eq!(1, sequencer.events(0).count());
        assert_eq!(1, sequencer.events(0).count());
        assert_eq!(1, sequencer.events(1000).count());
    }

    #[test]
    fn test_empty_pattern_is_silent() {
        let mut sequencer = Sequencer::new(vec![], 10, Some(5));
        assert_eq!(0, sequencer.events(1000).count());
    }

    #[test]
    fn test_hold_clamped_to_interval() {
        let mut sequencer = Sequencer::new(vec![note(36)], 10, Some(50));
        assert_eq!(1, sequencer.events(0).count());
        let events: Vec<NoteEvent> = sequencer.events(10).collect();
        assert_eq!(2, events.len());
        assert!(matches!(events[0], NoteEvent::Off { .. }));
    }
}
