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

//! Control-to-render command queue.
//!
//! The control context never touches the voice pool directly. It queues
//! [`Command`]s through a [`SamplerController`] and the sampler applies them at
//! the start of its next render call.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::config::SamplerParameters;

/// Errors surfaced to the control context.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("sampler command queue is full")]
    QueueFull,

    #[error("sampler is no longer receiving commands")]
    Disconnected,

    #[error("voices did not stop within {0:?}")]
    StopTimeout(Duration),
}

/// A change to one continuous sampler parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    MasterVolume(f32),
    /// Decibels.
    OverallGain(f32),
    OverallPan(f32),
    /// Semitones.
    PitchOffset(f32),
    VibratoDepth(f32),
    VibratoFrequency(f32),
    VoiceVibratoDepth(f32),
    VoiceVibratoFrequency(f32),
    LfoRate(f32),
    LfoDepth(f32),
    LfoTargetPitch(bool),
    LfoTargetGain(bool),
    LfoTargetFilter(bool),
    Monophonic(bool),
    Legato(bool),
    /// Seconds per octave.
    GlideRate(f32),
    CutoffMultiple(f32),
    KeyTracking(f32),
    CutoffEnvelopeStrength(f32),
    FilterEnvelopeVelocityScaling(f32),
    LinearResonance(f32),
    PitchEnvelopeSemitones(f32),
    LoopThruRelease(bool),
    RestartVoiceLfo(bool),
}

impl Parameter {
    pub(crate) fn apply(self, parameters: &mut SamplerParameters) {
        match self {
            Parameter::MasterVolume(value) => parameters.master_volume = value,
            Parameter::OverallGain(value) => parameters.overall_gain = value,
            Parameter::OverallPan(value) => parameters.overall_pan = value.clamp(-1.0, 1.0),
            Parameter::PitchOffset(value) => parameters.pitch_offset = value,
            Parameter::VibratoDepth(value) => parameters.vibrato_depth = value,
            Parameter::VibratoFrequency(value) => parameters.vibrato_frequency = value,
            Parameter::VoiceVibratoDepth(value) => parameters.voice_vibrato_depth = value,
            Parameter::VoiceVibratoFrequency(value) => parameters.voice_vibrato_frequency = value,
            Parameter::LfoRate(value) => parameters.lfo_rate = value,
            Parameter::LfoDepth(value) => parameters.lfo_depth = value,
            Parameter::LfoTargetPitch(value) => parameters.lfo_target_pitch = value,
            Parameter::LfoTargetGain(value) => parameters.lfo_target_gain = value,
            Parameter::LfoTargetFilter(value) => parameters.lfo_target_filter = value,
            Parameter::Monophonic(value) => parameters.is_monophonic = value,
            Parameter::Legato(value) => parameters.is_legato = value,
            Parameter::GlideRate(value) => parameters.glide_rate = value,
            Parameter::CutoffMultiple(value) => parameters.cutoff_multiple = value,
            Parameter::KeyTracking(value) => parameters.key_tracking = value,
            Parameter::CutoffEnvelopeStrength(value) => {
                parameters.cutoff_envelope_strength = value
            }
            Parameter::FilterEnvelopeVelocityScaling(value) => {
                parameters.filter_envelope_velocity_scaling = value
            }
            Parameter::LinearResonance(value) => parameters.linear_resonance = value,
            Parameter::PitchEnvelopeSemitones(value) => parameters.pitch_envelope_semitones = value,
            Parameter::LoopThruRelease(value) => parameters.loop_thru_release = value,
            Parameter::RestartVoiceLfo(value) => parameters.restart_voice_lfo = value,
        }
    }
}

/// One stage setting of one of the three envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeParam {
    AmpAttack,
    AmpHold,
    AmpDecay,
    AmpSustain,
    AmpReleaseHold,
    AmpRelease,
    FilterAttack,
    FilterDecay,
    FilterSustain,
    FilterRelease,
    PitchAttack,
    PitchDecay,
    PitchSustain,
    PitchRelease,
}

/// Work queued for the render context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, immediate: bool },
    SustainPedal(bool),
    SetParameter(Parameter),
    SetEnvelope(EnvelopeParam, f32),
    SetTuning { note: u8, frequency: f32 },
    StopAllVoices,
    RestartVoices,
}

/// Control-side handle to a [`super::Sampler`] running in another context.
#[derive(Clone)]
pub struct SamplerController {
    commands: Sender<Command>,
    stopped: Receiver<()>,
}

impl SamplerController {
    pub(crate) fn new(commands: Sender<Command>, stopped: Receiver<()>) -> Self {
        Self { commands, stopped }
    }

    /// Queues a command without blocking.
    pub fn send(&self, command: Command) -> Result<(), SamplerError> {
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                warn!(?command, "Sampler command queue full, dropping command");
                Err(SamplerError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(SamplerError::Disconnected),
        }
    }

    pub fn note_on(&self, note: u8, velocity: u8) -> Result<(), SamplerError> {
        self.send(Command::NoteOn { note, velocity })
    }

    pub fn note_off(&self, note: u8, immediate: bool) -> Result<(), SamplerError> {
        self.send(Command::NoteOff { note, immediate })
    }

    pub fn set_sustain_pedal(&self, down: bool) -> Result<(), SamplerError> {
        self.send(Command::SustainPedal(down))
    }

    pub fn set_parameter(&self, parameter: Parameter) -> Result<(), SamplerError> {
        self.send(Command::SetParameter(parameter))
    }

    pub fn set_envelope_param(&self, param: EnvelopeParam, value: f32) -> Result<(), SamplerError> {
        self.send(Command::SetEnvelope(param, value))
    }

    pub fn set_tuning(&self, note: u8, frequency: f32) -> Result<(), SamplerError> {
        self.send(Command::SetTuning { note, frequency })
    }

    /// Locks out new notes, releases every voice and blocks until the render
    /// context reports the pool empty or `timeout` passes.
    pub fn stop_all_voices(&self, timeout: Duration) -> Result<(), SamplerError> {
        // Discard a completion left over from an earlier stop.
        while self.stopped.try_recv().is_ok() {}

        self.send(Command::StopAllVoices)?;
        match self.stopped.recv_timeout(timeout) {
            Ok(()) => {
                debug!("All sampler voices stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(SamplerError::StopTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SamplerError::Disconnected),
        }
    }

    /// Lifts the lockout set by [`SamplerController::stop_all_voices`].
    pub fn restart_voices(&self) -> Result<(), SamplerError> {
        self.send(Command::RestartVoices)
    }
}

impl std::fmt::Debug for SamplerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerController")
            .field("queued", &self.commands.len())
            .finish()
    }
}
