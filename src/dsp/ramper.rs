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

/// Steps linearly toward a target over a fixed number of samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRamper {
    value: f32,
    target: f32,
    increment: f32,
    remaining: u32,
}

impl LinearRamper {
    /// Jumps straight to `value`.
    pub fn init(&mut self, value: f32) {
        self.value = value;
        self.target = value;
        self.increment = 0.0;
        self.remaining = 0;
    }

    /// Ramps from the current value to `target` over `frames` samples.
    pub fn reinit(&mut self, target: f32, frames: u32) {
        if frames == 0 {
            self.init(target);
            return;
        }
        self.target = target;
        self.increment = (target - self.value) / frames as f32;
        self.remaining = frames;
    }

    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.value = if self.remaining == 0 {
                self.target
            } else {
                self.value + self.increment
            };
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}
