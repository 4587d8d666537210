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

//! Linear envelope generators advanced once per render chunk.
//!
//! Both envelopes run at the control rate (sample rate divided by the chunk
//! size). The voice asks for one level per chunk and smooths between levels
//! with a [`super::LinearRamper`].

use serde::{Deserialize, Serialize};

/// Length of the ramp-down used when a sounding envelope is restarted.
const PRE_START_SECONDS: f32 = 0.005;

/// Parameters for the amplitude envelope (attack, hold, decay, sustain, release hold, release).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct AhdshrParameters {
    pub attack_seconds: f32,
    pub hold_seconds: f32,
    pub decay_seconds: f32,
    pub sustain_fraction: f32,
    pub release_hold_seconds: f32,
    pub release_seconds: f32,
}

impl Default for AhdshrParameters {
    fn default() -> Self {
        Self {
            attack_seconds: 0.0,
            hold_seconds: 0.0,
            decay_seconds: 0.0,
            sustain_fraction: 1.0,
            release_hold_seconds: 0.0,
            release_seconds: 0.0,
        }
    }
}

/// Parameters for the filter and pitch envelopes.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct AdsrParameters {
    pub attack_seconds: f32,
    pub decay_seconds: f32,
    pub sustain_fraction: f32,
    pub release_seconds: f32,
}

impl Default for AdsrParameters {
    fn default() -> Self {
        Self {
            attack_seconds: 0.0,
            decay_seconds: 0.0,
            sustain_fraction: 1.0,
            release_seconds: 0.0,
        }
    }
}

/// A straight line from one level to another over a whole number of ticks.
#[derive(Clone, Copy, Debug, Default)]
struct Segment {
    start: f32,
    end: f32,
    total: u32,
    elapsed: u32,
}

impl Segment {
    fn new(start: f32, end: f32, total: u32) -> Self {
        Self {
            start,
            end,
            total: total.max(1),
            elapsed: 0,
        }
    }

    fn advance(&mut self) -> f32 {
        self.elapsed = (self.elapsed + 1).min(self.total);
        let progress = self.elapsed as f32 / self.total as f32;
        self.start + (self.end - self.start) * progress
    }

    fn is_finished(&self) -> bool {
        self.elapsed >= self.total
    }
}

fn seconds_to_ticks(seconds: f32, control_rate: f32) -> u32 {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    // Any positive duration lasts at least one tick.
    ((seconds * control_rate).round() as u32).max(1)
}

/// Stages of the amplitude envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AhdshrStage {
    Idle,
    /// Ramping the previous note down to silence before a restart attacks.
    PreStarting,
    Attack,
    Hold,
    Decay,
    Sustain,
    ReleaseHold,
    Release,
}

impl AhdshrStage {
    fn next(self) -> Self {
        match self {
            AhdshrStage::PreStarting => AhdshrStage::Attack,
            AhdshrStage::Attack => AhdshrStage::Hold,
            AhdshrStage::Hold => AhdshrStage::Decay,
            AhdshrStage::Decay => AhdshrStage::Sustain,
            AhdshrStage::ReleaseHold => AhdshrStage::Release,
            AhdshrStage::Release | AhdshrStage::Idle => AhdshrStage::Idle,
            AhdshrStage::Sustain => AhdshrStage::Sustain,
        }
    }
}

/// Amplitude envelope with hold and release-hold stages.
#[derive(Debug, Clone)]
pub struct AhdshrEnvelope {
    parameters: AhdshrParameters,
    control_rate: f32,
    stage: AhdshrStage,
    level: f32,
    segment: Segment,
    /// Number of times this envelope has been (re)triggered.
    trigger_count: u64,
}

impl AhdshrEnvelope {
    /// Creates an idle envelope running at the given control rate (ticks per second).
    pub fn new(control_rate: f32) -> Self {
        Self {
            parameters: AhdshrParameters::default(),
            control_rate,
            stage: AhdshrStage::Idle,
            level: 0.0,
            segment: Segment::default(),
            trigger_count: 0,
        }
    }

    /// Replaces the parameters. Takes effect at the next stage boundary, except
    /// for the sustain level which is read live.
    pub fn update_parameters(&mut self, parameters: AhdshrParameters) {
        self.parameters = parameters;
    }

    /// Starts a new note from silence.
    pub fn start(&mut self) {
        self.trigger_count += 1;
        self.level = 0.0;
        self.enter(AhdshrStage::Attack);
    }

    /// Retriggers a sounding envelope, ramping down to silence first.
    pub fn restart(&mut self) {
        if self.stage == AhdshrStage::Idle {
            self.start();
            return;
        }
        self.trigger_count += 1;
        self.enter(AhdshrStage::PreStarting);
    }

    /// Moves to the release stages from whatever level the envelope is at.
    pub fn release(&mut self) {
        if matches!(
            self.stage,
            AhdshrStage::Idle | AhdshrStage::ReleaseHold | AhdshrStage::Release
        ) {
            return;
        }
        self.enter(AhdshrStage::ReleaseHold);
    }

    /// Silences the envelope immediately.
    pub fn reset(&mut self) {
        self.stage = AhdshrStage::Idle;
        self.level = 0.0;
        self.segment = Segment::default();
    }

    /// Advances one control tick and returns the new level.
    pub fn next_level(&mut self) -> f32 {
        match self.stage {
            AhdshrStage::Idle => self.level = 0.0,
            AhdshrStage::Sustain => self.level = self.parameters.sustain_fraction,
            stage => {
                let level = self.segment.advance();
                self.level = level;
                if self.segment.is_finished() {
                    self.enter(stage.next());
                }
                return level;
            }
        }
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == AhdshrStage::Idle
    }

    pub fn is_pre_starting(&self) -> bool {
        self.stage == AhdshrStage::PreStarting
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self.stage, AhdshrStage::ReleaseHold | AhdshrStage::Release)
    }

    pub fn stage(&self) -> AhdshrStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count
    }

    /// Enters a stage, skipping through any stage whose duration rounds to zero ticks.
    fn enter(&mut self, mut stage: AhdshrStage) {
        loop {
            let (target, seconds) = match stage {
                AhdshrStage::Idle => {
                    self.reset();
                    return;
                }
                AhdshrStage::Sustain => {
                    self.stage = AhdshrStage::Sustain;
                    self.level = self.parameters.sustain_fraction;
                    return;
                }
                AhdshrStage::PreStarting => (0.0, PRE_START_SECONDS),
                AhdshrStage::Attack => (1.0, self.parameters.attack_seconds),
                AhdshrStage::Hold => (1.0, self.parameters.hold_seconds),
                AhdshrStage::Decay => (
                    self.parameters.sustain_fraction,
                    self.parameters.decay_seconds,
                ),
                AhdshrStage::ReleaseHold => (self.level, self.parameters.release_hold_seconds),
                AhdshrStage::Release => (0.0, self.parameters.release_seconds),
            };

            let ticks = seconds_to_ticks(seconds, self.control_rate);
            if ticks == 0 {
                self.level = target;
                stage = stage.next();
                continue;
            }

            self.segment = Segment::new(self.level, target, ticks);
            self.stage = stage;
            return;
        }
    }
}

/// Stages of the filter and pitch envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Plain ADSR envelope used for filter cutoff and pitch modulation.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    parameters: AdsrParameters,
    control_rate: f32,
    stage: AdsrStage,
    level: f32,
    segment: Segment,
}

impl AdsrEnvelope {
    pub fn new(control_rate: f32) -> Self {
        Self {
            parameters: AdsrParameters::default(),
            control_rate,
            stage: AdsrStage::Idle,
            level: 0.0,
            segment: Segment::default(),
        }
    }

    pub fn update_parameters(&mut self, parameters: AdsrParameters) {
        self.parameters = parameters;
    }

    pub fn start(&mut self) {
        self.level = 0.0;
        self.enter(AdsrStage::Attack);
    }

    /// Re-enters the attack stage from the current level.
    pub fn restart(&mut self) {
        self.enter(AdsrStage::Attack);
    }

    pub fn release(&mut self) {
        if matches!(self.stage, AdsrStage::Idle | AdsrStage::Release) {
            return;
        }
        self.enter(AdsrStage::Release);
    }

    pub fn reset(&mut self) {
        self.stage = AdsrStage::Idle;
        self.level = 0.0;
        self.segment = Segment::default();
    }

    pub fn next_level(&mut self) -> f32 {
        match self.stage {
            AdsrStage::Idle => self.level = 0.0,
            AdsrStage::Sustain => self.level = self.parameters.sustain_fraction,
            stage => {
                let level = self.segment.advance();
                self.level = level;
                if self.segment.is_finished() {
                    self.enter(match stage {
                        AdsrStage::Attack => AdsrStage::Decay,
                        AdsrStage::Decay => AdsrStage::Sustain,
                        _ => AdsrStage::Idle,
                    });
                }
                return level;
            }
        }
        self.level
    }

    pub fn stage(&self) -> AdsrStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    fn enter(&mut self, mut stage: AdsrStage) {
        loop {
            let (target, seconds, next) = match stage {
                AdsrStage::Idle => {
                    self.reset();
                    return;
                }
                AdsrStage::Sustain => {
                    self.stage = AdsrStage::Sustain;
                    self.level = self.parameters.sustain_fraction;
                    return;
                }
                AdsrStage::Attack => (1.0, self.parameters.attack_seconds, AdsrStage::Decay),
                AdsrStage::Decay => (
                    self.parameters.sustain_fraction,
                    self.parameters.decay_seconds,
                    AdsrStage::Sustain,
                ),
                AdsrStage::Release => (0.0, self.parameters.release_seconds, AdsrStage::Idle),
            };

            let ticks = seconds_to_ticks(seconds, self.control_rate);
            if ticks == 0 {
                self.level = target;
                stage = next;
                continue;
            }

            self.segment = Segment::new(self.level, target, ticks);
            self.stage = stage;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL_RATE: f32 = 1_000.0;

    fn ticks(envelope: &mut AhdshrEnvelope, count: usize) {
        for _ in 0..count {
            envelope.next_level();
        }
    }

    #[test]
    fn test_attack_reaches_full_level() {
        let mut envelope = AhdshrEnvelope::new(CONTROL_RATE);
        envelope.update_parameters(AhdshrParameters {
            attack_seconds: 0.01,
            sustain_fraction: 0.5,
            decay_seconds: 0.01,
            ..Default::default()
        });
        envelope.start();
        assert_eq!(envelope.stage(), AhdshrStage::Attack);

        ticks(&mut envelope, 10);
        assert!((envelope.level() - 1.0).abs() < 1e-6);
        assert_eq!(envelope.stage(), AhdshrStage::Decay);

        ticks(&mut envelope, 10);
        assert_eq!(envelope.stage(), AhdshrStage::Sustain);
        assert!((envelope.level() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_length_stages_are_skipped() {
        let mut envelope = AhdshrEnvelope::new(CONTROL_RATE);
        envelope.start();
        assert_eq!(envelope.stage(), AhdshrStage::Sustain);
        assert_eq!(envelope.next_level(), 1.0);

        envelope.release();
        assert!(envelope.is_idle());
    }

    #[test]
    fn test_release_hold_then_release() {
        let mut envelope = AhdshrEnvelope::new(CONTROL_RATE);
        envelope.update_parameters(AhdshrParameters {
            sustain_fraction: 0.8,
            release_hold_seconds: 0.005,
            release_seconds: 0.01,
            ..Default::default()
        });
        envelope.start();
        envelope.release();
        assert_eq!(envelope.stage(), AhdshrStage::ReleaseHold);
        assert!(envelope.is_releasing());

        ticks(&mut envelope, 5);
        assert_eq!(envelope.stage(), AhdshrStage::Release);
        assert!((envelope.level() - 0.8).abs() < 1e-6);

        ticks(&mut envelope, 10);
        assert!(envelope.is_idle());
        assert_eq!(envelope.level(), 0.0);
    }

    #[test]
    fn test_restart_passes_through_pre_start() {
        let mut envelope = AhdshrEnvelope::new(CONTROL_RATE);
        envelope.start();
        envelope.restart();
        assert!(envelope.is_pre_starting());
        assert_eq!(envelope.trigger_count(), 2);

        ticks(&mut envelope, 5);
        assert!(!envelope.is_pre_starting());
        assert_eq!(envelope.stage(), AhdshrStage::Sustain);
    }

    #[test]
    fn test_restart_from_idle_is_a_start() {
        let mut envelope = AhdshrEnvelope::new(CONTROL_RATE);
        envelope.restart();
        assert!(!envelope.is_pre_starting());
        assert_eq!(envelope.trigger_count(), 1);
    }

    #[test]
    fn test_adsr_cycle() {
        let mut envelope = AdsrEnvelope::new(CONTROL_RATE);
        envelope.update_parameters(AdsrParameters {
            attack_seconds: 0.004,
            decay_seconds: 0.004,
            sustain_fraction: 0.25,
            release_seconds: 0.004,
        });
        envelope.start();
        for _ in 0..4 {
            envelope.next_level();
        }
        assert_eq!(envelope.stage(), AdsrStage::Decay);
        for _ in 0..4 {
            envelope.next_level();
        }
        assert_eq!(envelope.stage(), AdsrStage::Sustain);
        assert!((envelope.next_level() - 0.25).abs() < 1e-6);

        envelope.release();
        for _ in 0..4 {
            envelope.next_level();
        }
        assert_eq!(envelope.stage(), AdsrStage::Idle);
    }
}
