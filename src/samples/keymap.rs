// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

//! Note-to-region mapping.

use serde::{Deserialize, Serialize};

use super::region::Region;
use super::tuning::{note_to_hz, TuningTable, NOTE_COUNT};

/// How notes are assigned to regions when the key map is built.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyMapMode {
    /// Every note plays the region(s) whose root frequency is closest to it.
    #[default]
    NearestPitch,
    /// Every note plays the region(s) whose note range covers it.
    ExplicitRange,
}

/// For each note number, the indices of the regions it triggers.
#[derive(Clone, Debug)]
pub struct KeyMap {
    notes: Vec<Vec<usize>>,
    valid: bool,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMap {
    pub fn new() -> Self {
        Self {
            notes: vec![Vec::new(); NOTE_COUNT],
            valid: false,
        }
    }

    /// Rebuilds the whole map from scratch.
    pub fn build(&mut self, regions: &[Region], tuning: &TuningTable, mode: KeyMapMode) {
        for (note, entries) in self.notes.iter_mut().enumerate() {
            entries.clear();
            let frequency = tuning.frequency(note as u8);

            match mode {
                KeyMapMode::NearestPitch => {
                    let distance =
                        |region: &Region| (region.root_frequency() - frequency).abs();
                    let nearest = regions
                        .iter()
                        .map(distance)
                        .fold(f32::INFINITY, f32::min);
                    entries.extend(
                        regions
                            .iter()
                            .enumerate()
                            .filter(|(_, region)| distance(region) == nearest)
                            .map(|(index, _)| index),
                    );
                }
                KeyMapMode::ExplicitRange => {
                    entries.extend(
                        regions
                            .iter()
                            .enumerate()
                            .filter(|(_, region)| {
                                let low = note_to_hz(region.min_note());
                                let high = note_to_hz(region.max_note());
                                (low..=high).contains(&frequency)
                            })
                            .map(|(index, _)| index),
                    );
                }
            }
        }
        self.valid = true;
    }

    /// Marks the map stale after the region list changes.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.notes.iter_mut().for_each(Vec::clear);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// All regions mapped to `note`, regardless of velocity.
    pub fn regions_for(&self, note: u8) -> &[usize] {
        if !self.valid {
            return &[];
        }
        self.notes
            .get(usize::from(note))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Regions mapped to `note` whose velocity layer contains `velocity`, in region order.
    pub fn lookup_samples<'a>(
        &'a self,
        note: u8,
        velocity: u8,
        regions: &'a [Region],
    ) -> impl Iterator<Item = usize> + 'a {
        self.regions_for(note).iter().copied().filter(move |&index| {
            regions
                .get(index)
                .is_some_and(|region| region.accepts_velocity(velocity))
        })
    }
}
