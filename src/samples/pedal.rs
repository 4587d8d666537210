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

use super::tuning::NOTE_COUNT;

/// Tracks held keys and notes kept alive by the sustain pedal.
#[derive(Clone, Debug)]
pub struct SustainPedalLogic {
    keys_down: [bool; NOTE_COUNT],
    sustained: [bool; NOTE_COUNT],
    pedal_is_down: bool,
}

impl Default for SustainPedalLogic {
    fn default() -> Self {
        Self {
            keys_down: [false; NOTE_COUNT],
            sustained: [false; NOTE_COUNT],
            pedal_is_down: false,
        }
    }
}

impl SustainPedalLogic {
    /// Records a key press. Returns true if the note is already sounding
    /// (held or sustained) and should be restarted rather than started again.
    pub fn key_down(&mut self, note: u8) -> bool {
        let index = usize::from(note);
        if index >= NOTE_COUNT {
            return false;
        }
        let restart = self.keys_down[index] || self.sustained[index];
        self.keys_down[index] = true;
        self.sustained[index] = false;
        restart
    }

    /// Records a key release. Returns true if the pedal keeps the note sounding.
    pub fn key_up(&mut self, note: u8) -> bool {
        let index = usize::from(note);
        if index >= NOTE_COUNT {
            return false;
        }
        self.keys_down[index] = false;
        if self.pedal_is_down {
            self.sustained[index] = true;
        }
        self.pedal_is_down
    }

    pub fn pedal_down(&mut self) {
        self.pedal_is_down = true;
    }

    /// Lifts the pedal and clears sustain. Calls `release` for every note that
    /// was sustaining.
    pub fn pedal_up(&mut self, mut release: impl FnMut(u8)) {
        self.pedal_is_down = false;
        for (note, sustained) in self.sustained.iter_mut().enumerate() {
            if std::mem::take(sustained) {
                release(note as u8);
            }
        }
    }

    pub fn is_pedal_down(&self) -> bool {
        self.pedal_is_down
    }

    /// Forgets all keys and sustained notes; the pedal position is kept.
    pub fn clear(&mut self) {
        self.keys_down = [false; NOTE_COUNT];
        self.sustained = [false; NOTE_COUNT];
    }
}
