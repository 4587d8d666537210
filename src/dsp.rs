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

//! Realtime-safe signal primitives driven by the voice engine.
//!
//! Everything in here is allocation-free once constructed, so each voice can
//! own its own copies and advance them from inside the render callback.

pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod oscillator;
pub mod ramper;

pub use envelope::{AdsrEnvelope, AdsrParameters, AhdshrEnvelope, AhdshrParameters};
pub use filter::ResonantLowPass;
pub use lfo::Lfo;
pub use oscillator::{PlaybackBounds, SampleOscillator};
pub use ramper::LinearRamper;

/// Converts a gain in decibels to a linear multiplier.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Returns the (left, right) multipliers for a pan position in [-1, 1].
///
/// This is a balance law: `left = min(1, 1 - pan)` and `right = min(1, 1 + pan)`.
/// Center leaves both channels at unity and the near side is never boosted
/// past 1. Panning only attenuates the far side, reaching silence at the
/// extremes.
#[inline]
pub fn pan_law(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let left = if pan <= 0.0 { 1.0 } else { 1.0 - pan };
    let right = if pan >= 0.0 { 1.0 } else { 1.0 + pan };
    (left, right)
}
