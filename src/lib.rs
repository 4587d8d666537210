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

//! A polyphonic sample playback engine.
//!
//! Regions of decoded audio are mapped across the keyboard, then played by a
//! fixed pool of voices with per-voice envelopes, a resonant filter, glide
//! and vibrato. The [`samples::Sampler`] renders stereo blocks and takes
//! commands from other threads through a [`samples::SamplerController`].

pub mod config;
pub mod dsp;
pub mod samples;
pub mod sfz;
pub mod wav;

#[cfg(test)]
mod testutil;
