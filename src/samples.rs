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

//! Polyphonic sample playback.
//!
//! This module provides:
//! - Region loading with loop point normalization
//! - Note to region key mapping with velocity layers
//! - A fixed voice pool with sustain pedal, monophonic and legato handling
//! - The chunked render loop and a command queue for driving it from another thread

mod command;
mod engine;
mod keymap;
mod pedal;
mod region;
mod tuning;
mod voice;

pub use command::{Command, EnvelopeParam, Parameter, SamplerController, SamplerError};
pub use engine::{ActiveNote, Sampler};
pub use keymap::{KeyMap, KeyMapMode};
pub use pedal::SustainPedalLogic;
pub use region::{Region, RegionDescriptor, SampleData};
pub use tuning::{note_to_hz, TuningTable, MIDDLE_C_HZ, NOTE_COUNT};
pub use voice::{Voice, VoiceHandle, VoiceState, VoiceStatus};
