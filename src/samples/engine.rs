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

//! The sampler: voice pool, note arbitration and the top-level render loop.

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info};

use super::command::{Command, EnvelopeParam, Parameter, SamplerController};
use super::keymap::{KeyMap, KeyMapMode};
use super::pedal::SustainPedalLogic;
use super::region::{Region, RegionDescriptor, SampleData};
use super::tuning::{TuningTable, NOTE_COUNT};
use super::voice::{BlockContext, Voice, VoiceHandle, VoiceStatus};
use crate::config::{SamplerConfig, SamplerParameters};
use crate::dsp::{db_to_linear, pan_law, AdsrParameters, AhdshrParameters, Lfo};

/// One note currently owning a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNote {
    pub note: u8,
    pub handle: VoiceHandle,
    pub in_release: bool,
}

/// A polyphonic sample player.
///
/// Control operations are available directly on `&mut Sampler` for single
/// threaded hosts, or through a [`SamplerController`] whose commands are
/// applied at the start of each [`Sampler::render`] call. Nothing reachable
/// from `render` allocates or logs.
pub struct Sampler {
    sample_rate: f32,
    chunk_size: usize,
    voices: Vec<Voice>,
    regions: Vec<Region>,
    key_map: KeyMap,
    key_map_mode: KeyMapMode,
    tuning: TuningTable,
    pedal: SustainPedalLogic,
    /// Keys held in monophonic mode, most recent last.
    held_notes: Vec<(u8, u8)>,
    active_notes: Vec<ActiveNote>,
    /// Scratch space for key-map lookups.
    candidates: Vec<usize>,
    parameters: SamplerParameters,
    amp_envelope: AhdshrParameters,
    filter_envelope: AdsrParameters,
    pitch_envelope: AdsrParameters,
    lfo: Lfo,
    vibrato: Lfo,
    /// Set while stopping all voices; no new notes are allocated.
    stopping: bool,
    stop_pending: bool,
    commands: Option<Receiver<Command>>,
    stopped: Option<Sender<()>>,
}

impl Sampler {
    /// Creates a sampler with its whole voice pool allocated up front.
    pub fn new(config: &SamplerConfig) -> Self {
        let sample_rate = config.sample_rate() as f32;
        let chunk_size = config.chunk_size().max(1);
        let polyphony = config.polyphony().max(1);
        let control_rate = sample_rate / chunk_size as f32;

        let mut voices: Vec<Voice> = (0..polyphony)
            .map(|slot| Voice::new(slot, sample_rate, chunk_size))
            .collect();
        for voice in voices.iter_mut() {
            voice.update_amp_parameters(*config.amp_envelope());
            voice.update_filter_parameters(*config.filter_envelope());
            voice.update_pitch_parameters(*config.pitch_envelope());
        }

        let parameters = config.parameters().clone();
        Self {
            sample_rate,
            chunk_size,
            voices,
            regions: Vec::new(),
            key_map: KeyMap::new(),
            key_map_mode: config.key_map(),
            tuning: TuningTable::default(),
            pedal: SustainPedalLogic::default(),
            held_notes: Vec::with_capacity(NOTE_COUNT),
            active_notes: Vec::with_capacity(polyphony),
            candidates: Vec::new(),
            lfo: Lfo::new(control_rate, parameters.lfo_rate),
            vibrato: Lfo::new(control_rate, parameters.vibrato_frequency),
            parameters,
            amp_envelope: *config.amp_envelope(),
            filter_envelope: *config.filter_envelope(),
            pitch_envelope: *config.pitch_envelope(),
            stopping: false,
            stop_pending: false,
            commands: None,
            stopped: None,
        }
    }

    /// Creates a controller for driving this sampler from another thread.
    /// Any previously created controller is disconnected.
    pub fn controller(&mut self, capacity: usize) -> SamplerController {
        let (command_tx, command_rx) = crossbeam_channel::bounded(capacity.max(1));
        let (stopped_tx, stopped_rx) = crossbeam_channel::bounded(1);
        self.commands = Some(command_rx);
        self.stopped = Some(stopped_tx);
        SamplerController::new(command_tx, stopped_rx)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Adds a region and returns its index. The key map must be rebuilt before
    /// the region can sound.
    pub fn load_region(&mut self, descriptor: &RegionDescriptor, data: SampleData) -> usize {
        let region = Region::new(descriptor, data);
        debug!(
            index = self.regions.len(),
            root_note = region.root_note(),
            frames = region.frame_count(),
            channels = region.channel_count(),
            looping = region.is_looping(),
            "Region loaded"
        );
        self.regions.push(region);
        self.key_map.invalidate();
        self.regions.len() - 1
    }

    /// Stops every voice and drops all regions.
    pub fn unload_all(&mut self) {
        self.stop_all_immediately();
        self.held_notes.clear();
        self.pedal.clear();
        self.regions.clear();
        self.key_map.invalidate();
        info!("All regions unloaded");
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Rebuilds the key map from the current regions.
    pub fn build_key_map(&mut self, mode: KeyMapMode) {
        self.key_map.build(&self.regions, &self.tuning, mode);
        self.key_map_mode = mode;
        self.candidates = Vec::with_capacity(self.regions.len());

        let mapped = (0..NOTE_COUNT as u8)
            .filter(|&note| !self.key_map.regions_for(note).is_empty())
            .count();
        info!(
            ?mode,
            regions = self.regions.len(),
            mapped_notes = mapped,
            "Key map built"
        );
    }

    /// Rebuilds the key map with the mode from the config or last build.
    pub fn rebuild_key_map(&mut self) {
        self.build_key_map(self.key_map_mode);
    }

    pub fn is_key_map_valid(&self) -> bool {
        self.key_map.is_valid()
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    /// Regions that `note` at `velocity` would play.
    pub fn lookup_samples(&self, note: u8, velocity: u8) -> Vec<usize> {
        self.key_map
            .lookup_samples(note, velocity, &self.regions)
            .collect()
    }

    /// Retunes one note. Takes effect for key mapping at the next build.
    pub fn set_tuning(&mut self, note: u8, frequency: f32) {
        self.tuning.set(note, frequency);
    }

    pub fn tuning(&self) -> &TuningTable {
        &self.tuning
    }

    /// Starts `note`. Velocity zero is treated as a note-off.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let dropped = self.handle_note_on(note, velocity);
        if dropped > 0 {
            debug!(note, velocity, dropped, "No free voice, regions not sounded");
        }
    }

    pub fn note_off(&mut self, note: u8, immediate: bool) {
        if usize::from(note) >= NOTE_COUNT {
            return;
        }
        let sustaining = self.pedal.key_up(note);

        if self.parameters.is_monophonic {
            self.mono_note_off(note, immediate, sustaining);
            return;
        }

        if sustaining && !immediate {
            return;
        }
        self.stop_note(note, immediate);
    }

    pub fn set_sustain_pedal(&mut self, down: bool) {
        if down {
            self.pedal.pedal_down();
            return;
        }

        let mut released = [false; NOTE_COUNT];
        self.pedal.pedal_up(|note| released[usize::from(note)] = true);

        if self.parameters.is_monophonic {
            if self.held_notes.is_empty() {
                self.release_all();
            }
            return;
        }
        for (note, _) in released.iter().enumerate().filter(|(_, released)| **released) {
            self.stop_note(note as u8, false);
        }
    }

    pub fn is_sustain_pedal_down(&self) -> bool {
        self.pedal.is_pedal_down()
    }

    pub fn set_parameter(&mut self, parameter: Parameter) {
        parameter.apply(&mut self.parameters);
    }

    pub fn parameters(&self) -> &SamplerParameters {
        &self.parameters
    }

    /// Sets one envelope stage on every voice.
    pub fn set_envelope_param(&mut self, param: EnvelopeParam, value: f32) {
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        let amp = &mut self.amp_envelope;
        let filter = &mut self.filter_envelope;
        let pitch = &mut self.pitch_envelope;
        match param {
            EnvelopeParam::AmpAttack => amp.attack_seconds = value,
            EnvelopeParam::AmpHold => amp.hold_seconds = value,
            EnvelopeParam::AmpDecay => amp.decay_seconds = value,
            EnvelopeParam::AmpSustain => amp.sustain_fraction = value.min(1.0),
            EnvelopeParam::AmpReleaseHold => amp.release_hold_seconds = value,
            EnvelopeParam::AmpRelease => amp.release_seconds = value,
            EnvelopeParam::FilterAttack => filter.attack_seconds = value,
            EnvelopeParam::FilterDecay => filter.decay_seconds = value,
            EnvelopeParam::FilterSustain => filter.sustain_fraction = value.min(1.0),
            EnvelopeParam::FilterRelease => filter.release_seconds = value,
            EnvelopeParam::PitchAttack => pitch.attack_seconds = value,
            EnvelopeParam::PitchDecay => pitch.decay_seconds = value,
            EnvelopeParam::PitchSustain => pitch.sustain_fraction = value.min(1.0),
            EnvelopeParam::PitchRelease => pitch.release_seconds = value,
        }
        self.push_envelopes();
    }

    pub fn envelope_param(&self, param: EnvelopeParam) -> f32 {
        let amp = &self.amp_envelope;
        let filter = &self.filter_envelope;
        let pitch = &self.pitch_envelope;
        match param {
            EnvelopeParam::AmpAttack => amp.attack_seconds,
            EnvelopeParam::AmpHold => amp.hold_seconds,
            EnvelopeParam::AmpDecay => amp.decay_seconds,
            EnvelopeParam::AmpSustain => amp.sustain_fraction,
            EnvelopeParam::AmpReleaseHold => amp.release_hold_seconds,
            EnvelopeParam::AmpRelease => amp.release_seconds,
            EnvelopeParam::FilterAttack => filter.attack_seconds,
            EnvelopeParam::FilterDecay => filter.decay_seconds,
            EnvelopeParam::FilterSustain => filter.sustain_fraction,
            EnvelopeParam::FilterRelease => filter.release_seconds,
            EnvelopeParam::PitchAttack => pitch.attack_seconds,
            EnvelopeParam::PitchDecay => pitch.decay_seconds,
            EnvelopeParam::PitchSustain => pitch.sustain_fraction,
            EnvelopeParam::PitchRelease => pitch.release_seconds,
        }
    }

    pub fn set_amp_envelope(&mut self, parameters: AhdshrParameters) {
        self.amp_envelope = parameters;
        self.push_envelopes();
    }

    pub fn set_filter_envelope(&mut self, parameters: AdsrParameters) {
        self.filter_envelope = parameters;
        self.push_envelopes();
    }

    pub fn set_pitch_envelope(&mut self, parameters: AdsrParameters) {
        self.pitch_envelope = parameters;
        self.push_envelopes();
    }

    pub fn amp_envelope(&self) -> &AhdshrParameters {
        &self.amp_envelope
    }

    pub fn filter_envelope(&self) -> &AdsrParameters {
        &self.filter_envelope
    }

    pub fn pitch_envelope(&self) -> &AdsrParameters {
        &self.pitch_envelope
    }

    /// Locks out new notes and releases every sounding voice. The pool drains
    /// over the following renders; [`Sampler::is_quiescent`] reports when it is
    /// empty.
    pub fn stop_all_voices(&mut self) {
        self.stopping = true;
        self.stop_pending = true;
        self.release_all();
    }

    /// Lifts the lockout set by [`Sampler::stop_all_voices`].
    pub fn restart_voices(&mut self) {
        self.stopping = false;
        self.stop_pending = false;
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// True when no voice is playing.
    pub fn is_quiescent(&self) -> bool {
        self.voices.iter().all(Voice::is_free)
    }

    pub fn voices(&self) -> impl Iterator<Item = VoiceStatus> + '_ {
        self.voices.iter().map(Voice::status)
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|voice| !voice.is_free()).count()
    }

    pub fn active_notes(&self) -> &[ActiveNote] {
        &self.active_notes
    }

    /// Renders into the two output buffers, overwriting them.
    ///
    /// Queued commands are applied first. The buffers are processed in
    /// `chunk_size` blocks; if they differ in length the excess is zeroed.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.drain_commands();

        let frames = left.len().min(right.len());
        let (left, left_excess) = left.split_at_mut(frames);
        let (right, right_excess) = right.split_at_mut(frames);
        left_excess.fill(0.0);
        right_excess.fill(0.0);

        for (left, right) in left
            .chunks_mut(self.chunk_size)
            .zip(right.chunks_mut(self.chunk_size))
        {
            self.render_chunk(left, right);
        }

        if self.stop_pending && self.is_quiescent() {
            self.stop_pending = false;
            if let Some(stopped) = &self.stopped {
                let _ = stopped.try_send(());
            }
        }
    }

    fn render_chunk(&mut self, left: &mut [f32], right: &mut [f32]) {
        left.fill(0.0);
        right.fill(0.0);

        self.lfo.set_frequency(self.parameters.lfo_rate);
        let lfo_value = self.lfo.next_sample() * self.parameters.lfo_depth;
        self.vibrato.set_frequency(self.parameters.vibrato_frequency);
        let vibrato = self.vibrato.next_sample() * self.parameters.vibrato_depth;

        let context = BlockContext {
            parameters: &self.parameters,
            frames: left.len(),
            sample_rate: self.sample_rate,
            pitch_offset: self.parameters.pitch_offset + vibrato,
            lfo_value,
        };

        for voice in self.voices.iter_mut().filter(|voice| !voice.is_free()) {
            let finished = voice.prepare(&context, &self.regions)
                || voice.render(&self.regions, left, right);
            if finished {
                let handle = voice.handle();
                voice.stop();
                self.active_notes.retain(|entry| entry.handle != handle);
            }
        }

        let gain = db_to_linear(self.parameters.overall_gain);
        let (pan_left, pan_right) = pan_law(self.parameters.overall_pan);
        left.iter_mut().for_each(|sample| *sample *= gain * pan_left);
        right.iter_mut().for_each(|sample| *sample *= gain * pan_right);
    }

    fn drain_commands(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };
        while let Ok(command) = commands.try_recv() {
            self.apply(command);
        }
        self.commands = Some(commands);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::NoteOn { note, velocity } => {
                self.handle_note_on(note, velocity);
            }
            Command::NoteOff { note, immediate } => self.note_off(note, immediate),
            Command::SustainPedal(down) => self.set_sustain_pedal(down),
            Command::SetParameter(parameter) => self.set_parameter(parameter),
            Command::SetEnvelope(param, value) => self.set_envelope_param(param, value),
            Command::SetTuning { note, frequency } => self.set_tuning(note, frequency),
            Command::StopAllVoices => self.stop_all_voices(),
            Command::RestartVoices => self.restart_voices(),
        }
    }

    /// Returns how many matching regions could not get a voice.
    fn handle_note_on(&mut self, note: u8, velocity: u8) -> usize {
        if usize::from(note) >= NOTE_COUNT {
            return 0;
        }
        if velocity == 0 {
            self.note_off(note, false);
            return 0;
        }
        let velocity = velocity.min(127);

        // Locked out or unmapped events are dropped before any arbitration.
        if self.stopping || !self.resolves(note, velocity) {
            return 0;
        }

        let another_key_held = self.held_notes.iter().any(|&(held, _)| held != note);
        let restart = self.pedal.key_down(note);

        if self.parameters.is_monophonic {
            self.held_notes.retain(|&(held, _)| held != note);
            self.held_notes.push((note, velocity));

            if self.parameters.is_legato && another_key_held && self.legato_to(note) {
                return 0;
            }
            self.stop_all_immediately();
            return self.play(note, velocity);
        }

        if restart && self.restart_sounding(note, velocity) {
            return 0;
        }
        self.play(note, velocity)
    }

    fn mono_note_off(&mut self, note: u8, immediate: bool, sustaining: bool) {
        let was_top = self.held_notes.last().map(|&(held, _)| held) == Some(note);
        self.held_notes.retain(|&(held, _)| held != note);

        match self.held_notes.last().copied() {
            None if immediate => self.stop_all_immediately(),
            None if !sustaining => self.release_all(),
            None => {}
            Some(_) if !was_top => {}
            Some((top, velocity)) if self.stopping || !self.resolves(top, velocity) => {
                if !sustaining {
                    self.release_all();
                }
            }
            Some((top, velocity)) => {
                if self.parameters.is_legato && self.legato_to(top) {
                    return;
                }
                self.stop_all_immediately();
                self.play(top, velocity);
            }
        }
    }

    fn resolves(&self, note: u8, velocity: u8) -> bool {
        self.key_map
            .lookup_samples(note, velocity, &self.regions)
            .next()
            .is_some()
    }

    /// Allocates one free voice per matching region. Returns the number of
    /// regions left unsounded because the pool was full.
    fn play(&mut self, note: u8, velocity: u8) -> usize {
        if self.stopping {
            return 0;
        }

        self.candidates.clear();
        self.candidates
            .extend(self.key_map.lookup_samples(note, velocity, &self.regions));

        let frequency = self.tuning.frequency(note);
        let volume = f32::from(velocity) / 127.0;
        let mut dropped = 0;

        for &index in &self.candidates {
            let Some(region) = self.regions.get(index) else {
                continue;
            };
            let Some(voice) = self.voices.iter_mut().find(|voice| voice.is_free()) else {
                dropped += 1;
                continue;
            };

            let detuned = frequency * 2.0_f32.powf(region.tune_cents() / 1200.0);
            let handle = voice.start(
                note,
                detuned,
                volume,
                index,
                region,
                self.parameters.glide_rate,
                self.parameters.restart_voice_lfo,
            );
            voice.set_gain_db(region.volume());
            voice.set_pan(region.pan());

            self.active_notes.push(ActiveNote {
                note,
                handle,
                in_release: false,
            });
        }
        dropped
    }

    /// Retriggers voices already playing `note`. Returns false if none were found.
    fn restart_sounding(&mut self, note: u8, velocity: u8) -> bool {
        if self.stopping {
            return false;
        }

        self.candidates.clear();
        self.candidates
            .extend(self.key_map.lookup_samples(note, velocity, &self.regions));

        let volume = f32::from(velocity) / 127.0;
        let restart_vibrato = self.parameters.restart_voice_lfo;
        let mut restarted = false;

        for entry in self.active_notes.iter_mut().filter(|entry| entry.note == note) {
            let Some(voice) = self
                .voices
                .get_mut(entry.handle.slot)
                .filter(|voice| voice.is_current(entry.handle))
            else {
                continue;
            };
            let current = voice.region();
            let region = match current {
                Some(index) if self.candidates.contains(&index) => index,
                _ => match self.candidates.first().copied().or(current) {
                    Some(index) => index,
                    None => continue,
                },
            };
            voice.restart_same_note(volume, region, restart_vibrato);
            entry.in_release = false;
            restarted = true;
        }
        restarted
    }

    /// Moves every unreleased voice to `note` without retriggering. Returns
    /// false if nothing was sounding.
    fn legato_to(&mut self, note: u8) -> bool {
        if self.stopping {
            return false;
        }

        let frequency = self.tuning.frequency(note);
        let glide_rate = self.parameters.glide_rate;
        let mut moved = false;

        for entry in self.active_notes.iter_mut().filter(|entry| !entry.in_release) {
            let Some(voice) = self
                .voices
                .get_mut(entry.handle.slot)
                .filter(|voice| voice.is_current(entry.handle))
            else {
                continue;
            };
            let Some(region) = voice.region().and_then(|index| self.regions.get(index)) else {
                continue;
            };
            let detuned = frequency * 2.0_f32.powf(region.tune_cents() / 1200.0);
            voice.restart_new_note_legato(note, detuned, region, glide_rate);
            entry.note = note;
            moved = true;
        }
        moved
    }

    /// Releases or stops every voice playing `note`.
    fn stop_note(&mut self, note: u8, immediate: bool) {
        let voices = &mut self.voices;
        let loop_thru_release = self.parameters.loop_thru_release;

        self.active_notes.retain_mut(|entry| {
            if entry.note != note {
                return true;
            }
            let Some(voice) = voices
                .get_mut(entry.handle.slot)
                .filter(|voice| voice.is_current(entry.handle))
            else {
                return false;
            };
            if immediate {
                voice.stop();
                return false;
            }
            if !entry.in_release {
                voice.release(loop_thru_release);
                entry.in_release = true;
            }
            true
        });
    }

    fn release_all(&mut self) {
        let loop_thru_release = self.parameters.loop_thru_release;
        for entry in self.active_notes.iter_mut().filter(|entry| !entry.in_release) {
            if let Some(voice) = self
                .voices
                .get_mut(entry.handle.slot)
                .filter(|voice| voice.is_current(entry.handle))
            {
                voice.release(loop_thru_release);
                entry.in_release = true;
            }
        }
    }

    fn stop_all_immediately(&mut self) {
        for voice in self.voices.iter_mut().filter(|voice| !voice.is_free()) {
            voice.stop();
        }
        self.active_notes.clear();
    }

    fn push_envelopes(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.update_amp_parameters(self.amp_envelope);
            voice.update_filter_parameters(self.filter_envelope);
            voice.update_pitch_parameters(self.pitch_envelope);
        }
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("sample_rate", &self.sample_rate)
            .field("chunk_size", &self.chunk_size)
            .field("polyphony", &self.voices.len())
            .field("regions", &self.regions.len())
            .field("active_voices", &self.active_voice_count())
            .field("stopping", &self.stopping)
            .finish()
    }
}
