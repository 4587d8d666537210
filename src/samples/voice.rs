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

//! A single pooled voice.
//!
//! Voices are allocated once and reused. Each render chunk runs two phases:
//! [`Voice::prepare`] advances envelopes, glide and modulation and reports
//! whether the voice is done, then [`Voice::render`] mixes its samples into the
//! output.

use crate::config::SamplerParameters;
use crate::dsp::{
    db_to_linear, pan_law, AdsrEnvelope, AdsrParameters, AhdshrEnvelope, AhdshrParameters,
    LinearRamper, Lfo, ResonantLowPass, SampleOscillator,
};

use super::region::Region;
use super::tuning::MIDDLE_C_HZ;

/// Glide offsets smaller than this many semitones are dropped.
const MIN_GLIDE_SEMITONES: f32 = 0.01;

/// Identifies one note played on one slot. A slot's generation changes every
/// time it starts a new note, so stale handles never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub slot: usize,
    pub generation: u64,
}

/// Lifecycle of a pooled voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,
    /// Crossfading out of the previous note before a restart.
    Starting,
    Active,
    Releasing,
}

/// Snapshot of one voice for hosts and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceStatus {
    pub handle: VoiceHandle,
    pub state: VoiceState,
    pub note: Option<u8>,
    pub region: Option<usize>,
    /// How many times the amplitude envelope has been triggered on this slot.
    pub amp_trigger_count: u64,
    /// Source frames read per output frame, with every pitch modulation applied.
    pub playback_rate: f64,
    /// Current low-pass cutoff in Hz, `None` while the filter is bypassed.
    pub filter_cutoff: Option<f32>,
}

/// Per-chunk values shared by every voice.
pub(crate) struct BlockContext<'a> {
    pub parameters: &'a SamplerParameters,
    pub frames: usize,
    pub sample_rate: f32,
    /// Global pitch offset with the shared vibrato already folded in.
    pub pitch_offset: f32,
    /// Shared LFO output scaled by its depth.
    pub lfo_value: f32,
}

fn glide_from(previous: f32, frequency: f32, glide_rate: f32) -> f32 {
    if glide_rate <= 0.0 || previous <= 0.0 || previous == frequency {
        return 0.0;
    }
    let semitones = -12.0 * (frequency / previous).log2();
    if semitones.abs() < MIN_GLIDE_SEMITONES || !semitones.is_finite() {
        0.0
    } else {
        semitones
    }
}

pub struct Voice {
    slot: usize,
    generation: u64,
    note: Option<u8>,
    region: Option<usize>,
    /// Region to splice in once a restart's pre-start window ends.
    pending_region: Option<usize>,
    sample_rate: f32,

    oscillator: SampleOscillator,
    left_filter: ResonantLowPass,
    right_filter: ResonantLowPass,
    filter_enabled: bool,

    amp_envelope: AhdshrEnvelope,
    filter_envelope: AdsrEnvelope,
    pitch_envelope: AdsrEnvelope,
    vibrato: Lfo,
    has_started_vibrato: bool,

    /// Frequency of the current note, zero before the first note.
    note_frequency: f32,
    glide_semitones: f32,
    note_volume: f32,
    /// Volume of the outgoing note during a restart.
    temp_note_volume: f32,
    temp_gain: f32,
    gain: f32,
    pan: f32,
    ramper: LinearRamper,
}

impl Voice {
    pub fn new(slot: usize, sample_rate: f32, chunk_size: usize) -> Self {
        let control_rate = sample_rate / chunk_size.max(1) as f32;
        Self {
            slot,
            generation: 0,
            note: None,
            region: None,
            pending_region: None,
            sample_rate,
            oscillator: SampleOscillator::default(),
            left_filter: ResonantLowPass::new(sample_rate),
            right_filter: ResonantLowPass::new(sample_rate),
            filter_enabled: false,
            amp_envelope: AhdshrEnvelope::new(control_rate),
            filter_envelope: AdsrEnvelope::new(control_rate),
            pitch_envelope: AdsrEnvelope::new(control_rate),
            vibrato: Lfo::new(control_rate, 5.0),
            has_started_vibrato: false,
            note_frequency: 0.0,
            glide_semitones: 0.0,
            note_volume: 0.0,
            temp_note_volume: 0.0,
            temp_gain: 0.0,
            gain: 1.0,
            pan: 0.0,
            ramper: LinearRamper::default(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.note.is_none()
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn region(&self) -> Option<usize> {
        self.region
    }

    pub fn handle(&self) -> VoiceHandle {
        VoiceHandle {
            slot: self.slot,
            generation: self.generation,
        }
    }

    /// True if `handle` names the note this voice is currently playing.
    pub fn is_current(&self, handle: VoiceHandle) -> bool {
        self.note.is_some() && self.handle() == handle
    }

    pub fn glide_semitones(&self) -> f32 {
        self.glide_semitones
    }

    pub fn state(&self) -> VoiceState {
        if self.note.is_none() {
            VoiceState::Free
        } else if self.amp_envelope.is_pre_starting() {
            VoiceState::Starting
        } else if self.amp_envelope.is_releasing() || self.amp_envelope.is_idle() {
            VoiceState::Releasing
        } else {
            VoiceState::Active
        }
    }

    pub fn status(&self) -> VoiceStatus {
        VoiceStatus {
            handle: self.handle(),
            state: self.state(),
            note: self.note,
            region: self.region,
            amp_trigger_count: self.amp_envelope.trigger_count(),
            playback_rate: self.oscillator.playback_rate(),
            filter_cutoff: self.filter_enabled.then(|| self.left_filter.cutoff()),
        }
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain = db_to_linear(gain_db);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn update_amp_parameters(&mut self, parameters: AhdshrParameters) {
        self.amp_envelope.update_parameters(parameters);
    }

    pub fn update_filter_parameters(&mut self, parameters: AdsrParameters) {
        self.filter_envelope.update_parameters(parameters);
    }

    pub fn update_pitch_parameters(&mut self, parameters: AdsrParameters) {
        self.pitch_envelope.update_parameters(parameters);
    }

    /// Starts a fresh note on this slot and returns its handle.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        note: u8,
        frequency: f32,
        volume: f32,
        region_index: usize,
        region: &Region,
        glide_rate: f32,
        restart_vibrato: bool,
    ) -> VoiceHandle {
        self.generation = self.generation.wrapping_add(1);
        self.region = Some(region_index);
        self.pending_region = None;
        self.oscillator.reset(
            region.start_point(),
            region.increment_for(frequency, self.sample_rate),
            region.is_looping(),
        );
        self.note_volume = volume;
        self.temp_note_volume = volume;

        self.amp_envelope.start();
        self.ramper.init(0.0);
        self.filter_envelope.start();
        self.pitch_envelope.start();
        self.left_filter.reset();
        self.right_filter.reset();

        self.glide_semitones = glide_from(self.note_frequency, frequency, glide_rate);
        self.note_frequency = frequency;
        self.note = Some(note);
        self.restart_vibrato_if_needed(restart_vibrato);
        self.handle()
    }

    /// Retriggers the note already playing here, crossfading through the
    /// pre-start window before switching to `region_index`.
    pub fn restart_same_note(&mut self, volume: f32, region_index: usize, restart_vibrato: bool) {
        self.temp_note_volume = self.note_volume;
        self.pending_region = Some(region_index);
        self.amp_envelope.restart();
        self.note_volume = volume;
        self.filter_envelope.restart();
        self.pitch_envelope.restart();
        self.restart_vibrato_if_needed(restart_vibrato);
    }

    /// Moves a sounding voice to a new pitch without retriggering any envelope.
    pub fn restart_new_note_legato(
        &mut self,
        note: u8,
        frequency: f32,
        region: &Region,
        glide_rate: f32,
    ) {
        self.oscillator
            .set_increment(region.increment_for(frequency, self.sample_rate));
        self.glide_semitones = glide_from(self.note_frequency, frequency, glide_rate);
        self.note_frequency = frequency;
        self.note = Some(note);
    }

    /// Starts the release stages. Looping stops unless `loop_thru_release` is set.
    pub fn release(&mut self, loop_thru_release: bool) {
        if !loop_thru_release {
            self.oscillator.set_looping(false);
        }
        self.amp_envelope.release();
        self.filter_envelope.release();
        self.pitch_envelope.release();
    }

    /// Silences the voice immediately and returns it to the pool.
    pub fn stop(&mut self) {
        self.note = None;
        self.region = None;
        self.pending_region = None;
        self.amp_envelope.reset();
        self.ramper.init(0.0);
        self.filter_envelope.reset();
        self.pitch_envelope.reset();
    }

    /// First render phase. Returns true when the voice should be stopped.
    pub(crate) fn prepare(&mut self, context: &BlockContext, regions: &[Region]) -> bool {
        if self.note.is_none() || self.amp_envelope.is_idle() {
            return true;
        }

        let parameters = context.parameters;
        let frames = context.frames as u32;

        // The outgoing note fades out over the pre-start window; the incoming
        // region is spliced in on the first chunk after it.
        let volume = if self.amp_envelope.is_pre_starting() {
            self.temp_note_volume
        } else {
            if let Some(index) = self.pending_region.take() {
                self.splice(index, regions);
            }
            self.note_volume
        };
        self.temp_gain = parameters.master_volume * volume;
        self.ramper.reinit(self.amp_envelope.next_level(), frames);

        if parameters.glide_rate > 0.0 && self.glide_semitones != 0.0 {
            let seconds = context.frames as f32 / context.sample_rate;
            let step = 12.0 * seconds / parameters.glide_rate;
            self.glide_semitones = if self.glide_semitones < 0.0 {
                (self.glide_semitones + step).min(0.0)
            } else {
                (self.glide_semitones - step).max(0.0)
            };
        }

        let pitch_envelope_semitones =
            self.pitch_envelope.next_level() * parameters.pitch_envelope_semitones;

        self.vibrato
            .set_frequency(parameters.voice_vibrato_frequency);
        let vibrato_semitones = self.vibrato.next_sample() * parameters.voice_vibrato_depth;

        let mut pitch_offset = context.pitch_offset;
        if parameters.lfo_target_pitch {
            pitch_offset += context.lfo_value;
        }
        if parameters.lfo_target_gain {
            self.temp_gain += context.lfo_value * 0.1;
        }

        let semitones =
            pitch_offset + self.glide_semitones + pitch_envelope_semitones + vibrato_semitones;
        self.oscillator.set_pitch_offset_semitones(semitones);

        let filter_level = self.filter_envelope.next_level();
        if parameters.cutoff_multiple < 0.0 {
            self.filter_enabled = false;
        } else {
            self.filter_enabled = true;
            let note_hz = self.note_frequency * 2.0_f32.powf(semitones / 12.0);
            let base = MIDDLE_C_HZ + parameters.key_tracking * (note_hz - MIDDLE_C_HZ);
            let velocity_scaling = parameters.filter_envelope_velocity_scaling;
            let strength = (1.0 - velocity_scaling) + velocity_scaling * self.note_volume;
            let mut cutoff = base
                * (1.0
                    + parameters.cutoff_multiple
                    + parameters.cutoff_envelope_strength * strength * filter_level);
            if parameters.lfo_target_filter {
                cutoff += context.lfo_value * 2000.0;
            }
            self.left_filter
                .set_parameters(cutoff, parameters.linear_resonance);
            self.right_filter
                .set_parameters(cutoff, parameters.linear_resonance);
        }

        false
    }

    /// Second render phase: mixes this voice into the outputs. Returns true if
    /// playback ran off the end of a non-looping region.
    pub(crate) fn render(
        &mut self,
        regions: &[Region],
        left: &mut [f32],
        right: &mut [f32],
    ) -> bool {
        let Some(region) = self.region.and_then(|index| regions.get(index)) else {
            return true;
        };
        let bounds = region.bounds();
        let (pan_left, pan_right) = pan_law(self.pan);

        for (out_left, out_right) in left.iter_mut().zip(right.iter_mut()) {
            let gain = self.temp_gain * self.ramper.next_value() * self.gain;
            let Some((sample_left, sample_right)) =
                self.oscillator
                    .next_pair(region.left(), region.right(), &bounds, gain)
            else {
                return true;
            };

            let sample_left = sample_left * pan_left;
            let sample_right = sample_right * pan_right;
            if self.filter_enabled {
                *out_left += self.left_filter.process(sample_left);
                *out_right += self.right_filter.process(sample_right);
            } else {
                *out_left += sample_left;
                *out_right += sample_right;
            }
        }
        false
    }

    fn splice(&mut self, index: usize, regions: &[Region]) {
        let Some(region) = regions.get(index) else {
            return;
        };
        self.region = Some(index);
        self.oscillator.reset(
            region.start_point(),
            region.increment_for(self.note_frequency, self.sample_rate),
            region.is_looping(),
        );
        self.set_gain_db(region.volume());
        self.set_pan(region.pan());
    }

    fn restart_vibrato_if_needed(&mut self, restart: bool) {
        if restart || !self.has_started_vibrato {
            self.vibrato.reset_phase();
            self.has_started_vibrato = true;
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("note", &self.note)
            .field("state", &self.state())
            .finish()
    }
}
