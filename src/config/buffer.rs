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

use serde::Deserialize;

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_BATCH_THRESHOLD: usize = 100;

/// A YAML representation of the streaming buffer configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Buffer {
    /// Number of samples the streaming buffer holds (default: 1000).
    capacity: Option<usize>,

    /// Free slots that must be exceeded before a refill renders (default: 100).
    batch_threshold: Option<usize>,
}

impl Buffer {
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_CAPACITY)
    }

    pub fn batch_threshold(&self) -> usize {
        self.batch_threshold.unwrap_or(DEFAULT_BATCH_THRESHOLD)
    }
}
