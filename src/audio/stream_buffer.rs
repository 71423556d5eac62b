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
// Fixed-capacity FIFO that sits between the sample source and the transport.
// Backed by a single allocation made at construction; every operation is O(1)
// and none of them block.
//

use super::Sample;

/// Bounded FIFO of samples. Pushing into a full buffer and popping from an
/// empty one are both rejected without touching the contents.
pub struct StreamingBuffer {
    /// Backing storage, never resized.
    slots: Box<[Sample]>,
    /// Index of the oldest sample.
    read_index: usize,
    /// Number of samples currently stored.
    len: usize,
}

impl StreamingBuffer {
    /// Creates an empty buffer with room for `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configuration validation rejects this
    /// before a buffer is ever built.
    pub fn new(capacity: usize) -> StreamingBuffer {
        assert!(capacity > 0, "streaming buffer capacity must be non-zero");
        StreamingBuffer {
            slots: vec![0; capacity].into_boxed_slice(),
            read_index: 0,
            len: 0,
        }
    }

    /// Appends a sample. Returns false, leaving the buffer unchanged, when full.
    #[inline]
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        let write_index = (self.read_index + self.len) % self.slots.len();
        self.slots[write_index] = sample;
        self.len += 1;
        true
    }

    /// Removes and returns the oldest sample, or None if the buffer is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<Sample> {
        let sample = self.peek()?;
        self.read_index = (self.read_index + 1) % self.slots.len();
        self.len -= 1;
        Some(sample)
    }

    /// Returns the oldest sample without removing it.
    #[inline]
    pub fn peek(&self) -> Option<Sample> {
        if self.len == 0 {
            None
        } else {
            Some(self.slots[self.read_index])
        }
    }

    /// Number of samples that can be pushed before the buffer is full.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.slots.len() - self.len
    }

    /// Number of samples currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Discards every buffered sample.
    pub fn clear(&mut self) {
        self.read_index = 0;
        self.len = 0;
    }
}
