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

use std::f32::consts::TAU;

const TABLE_SIZE: usize = 1024;

/// A sine function-table oscillator advanced once per control tick.
#[derive(Debug, Clone)]
pub struct Lfo {
    table: Box<[f32]>,
    control_rate: f32,
    frequency: f32,
    phase: f32,
}

impl Lfo {
    pub fn new(control_rate: f32, frequency: f32) -> Self {
        let table = (0..TABLE_SIZE)
            .map(|i| (TAU * i as f32 / TABLE_SIZE as f32).sin())
            .collect();
        Self {
            table,
            control_rate,
            frequency,
            phase: 0.0,
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
    }

    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
    }

    /// Returns the value at the current phase in [-1, 1], then advances.
    pub fn next_sample(&mut self) -> f32 {
        let position = self.phase * TABLE_SIZE as f32;
        let index = position as usize % TABLE_SIZE;
        let next = (index + 1) % TABLE_SIZE;
        let fraction = position.fract();
        let value = self.table[index] + (self.table[next] - self.table[index]) * fraction;

        if self.control_rate > 0.0 {
            self.phase += self.frequency / self.control_rate;
            self.phase -= self.phase.floor();
        }
        value
    }
}
