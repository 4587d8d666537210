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

/// Reference pitch used by the filter's key tracking.
pub const MIDDLE_C_HZ: f32 = 262.626;

/// Number of MIDI note numbers.
pub const NOTE_COUNT: usize = 128;

/// Equal-tempered frequency of a MIDI note, with A4 (69) at 440 Hz.
pub fn note_to_hz(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((f32::from(note) - 69.0) / 12.0)
}

/// Per-note frequencies used for playback and key-map building.
#[derive(Clone, Debug, PartialEq)]
pub struct TuningTable {
    frequencies: [f32; NOTE_COUNT],
}

impl Default for TuningTable {
    fn default() -> Self {
        let mut frequencies = [0.0; NOTE_COUNT];
        for (note, frequency) in frequencies.iter_mut().enumerate() {
            *frequency = note_to_hz(note as u8);
        }
        Self { frequencies }
    }
}

impl TuningTable {
    /// Retunes one note. Out-of-range notes and non-positive frequencies are ignored.
    pub fn set(&mut self, note: u8, frequency: f32) -> bool {
        match self.frequencies.get_mut(usize::from(note)) {
            Some(slot) if frequency.is_finite() && frequency > 0.0 => {
                *slot = frequency;
                true
            }
            _ => false,
        }
    }

    /// Returns the frequency of `note`, clamping it to 127.
    pub fn frequency(&self, note: u8) -> f32 {
        self.frequencies[usize::from(note.min(127))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_temperament() {
        let tuning = TuningTable::default();
        assert_eq!(tuning.frequency(69), 440.0);
        assert!((tuning.frequency(60) - 261.6256).abs() < 1e-3);
        assert!((tuning.frequency(81) - 880.0).abs() < 1e-3);
    }

    #[test]
    fn test_set() {
        let mut tuning = TuningTable::default();
        assert!(tuning.set(60, 256.0));
        assert_eq!(tuning.frequency(60), 256.0);

        assert!(!tuning.set(128, 100.0));
        assert!(!tuning.set(61, -1.0));
        assert!(!tuning.set(61, f32::NAN));
        assert_eq!(tuning.frequency(61), note_to_hz(61));
    }
}
