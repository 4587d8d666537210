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

//! Sample regions: audio data plus the key, velocity, tuning and loop tagging
//! that decides when and how it plays.

use serde::{Deserialize, Serialize};

use super::tuning::note_to_hz;
use crate::dsp::PlaybackBounds;

/// Tagging for a region as supplied by the host, before normalization.
///
/// Loop points above 1.0 are absolute frame indices; values in [0, 1] are
/// fractions of the end point. A zero start, end or loop end means unset.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RegionDescriptor {
    pub root_note: u8,
    /// Overrides the equal-tempered frequency of `root_note`.
    pub root_frequency: Option<f32>,
    pub tune_cents: f32,
    pub min_note: u8,
    pub max_note: u8,
    pub min_velocity: u8,
    pub max_velocity: u8,
    pub is_looping: bool,
    pub start_point: f32,
    pub end_point: f32,
    pub loop_start_point: f32,
    pub loop_end_point: f32,
    /// Gain in decibels.
    pub volume: f32,
    pub pan: f32,
}

impl Default for RegionDescriptor {
    fn default() -> Self {
        Self {
            root_note: 60,
            root_frequency: None,
            tune_cents: 0.0,
            min_note: 0,
            max_note: 127,
            min_velocity: 0,
            max_velocity: 127,
            is_looping: false,
            start_point: 0.0,
            end_point: 0.0,
            loop_start_point: 0.0,
            loop_end_point: 0.0,
            volume: 0.0,
            pan: 0.0,
        }
    }
}

/// Decoded audio for one region, stored one buffer per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleData {
    sample_rate: f32,
    channels: Vec<Vec<f32>>,
}

impl SampleData {
    /// Splits interleaved frames into per-channel buffers.
    pub fn interleaved(samples: &[f32], channel_count: usize, sample_rate: f32) -> Self {
        let channel_count = channel_count.max(1);
        let channels = (0..channel_count)
            .map(|channel| {
                samples
                    .chunks_exact(channel_count)
                    .map(|frame| frame[channel])
                    .collect()
            })
            .collect();
        Self {
            sample_rate,
            channels,
        }
    }

    /// Takes ownership of already separated channel buffers.
    ///
    /// Channels are truncated to the shortest one.
    pub fn planar(mut channels: Vec<Vec<f32>>, sample_rate: f32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        channels.iter_mut().for_each(|channel| channel.truncate(frames));
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

/// A loaded, normalized region owned by the sampler.
#[derive(Clone, Debug)]
pub struct Region {
    min_note: u8,
    max_note: u8,
    min_velocity: u8,
    max_velocity: u8,
    volume: f32,
    pan: f32,
    tune_cents: f32,
    root_note: u8,
    root_frequency: f32,
    sample_rate: f32,
    channel_count: usize,
    frame_count: usize,
    is_looping: bool,
    start_point: f64,
    end_point: f64,
    loop_start_point: f64,
    loop_end_point: f64,
    left: Vec<f32>,
    right: Option<Vec<f32>>,
}

fn sanitize(value: f32) -> f64 {
    if value.is_finite() && value > 0.0 {
        f64::from(value)
    } else {
        0.0
    }
}

fn ordered_range(low: u8, high: u8) -> (u8, u8) {
    let (low, high) = (low.min(127), high.min(127));
    if low <= high {
        (low, high)
    } else {
        (high, low)
    }
}

impl Region {
    /// Builds a region, clamping every point so that
    /// `start <= loop_start <= loop_end <= end <= frame_count`.
    pub fn new(descriptor: &RegionDescriptor, data: SampleData) -> Self {
        let frames = data.frame_count() as f64;

        // The end is an exclusive whole frame; anything under one frame is empty.
        let end = match sanitize(descriptor.end_point) {
            end if end > 0.0 => end.floor().min(frames),
            _ => frames,
        };
        let start = sanitize(descriptor.start_point).min(end);

        let resolve = |point: f64| if point > 1.0 { point } else { point * end };
        let loop_start = resolve(sanitize(descriptor.loop_start_point)).clamp(start, end);
        let loop_end = match sanitize(descriptor.loop_end_point) {
            point if point > 0.0 => resolve(point),
            _ => end,
        }
        .clamp(loop_start, end);

        let (min_note, max_note) = ordered_range(descriptor.min_note, descriptor.max_note);
        let (min_velocity, max_velocity) =
            ordered_range(descriptor.min_velocity, descriptor.max_velocity);
        let root_note = descriptor.root_note.min(127);
        let root_frequency = descriptor
            .root_frequency
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .unwrap_or_else(|| note_to_hz(root_note));

        let sample_rate = data.sample_rate();
        let channel_count = data.channel_count();
        let frame_count = data.frame_count();
        let mut channels = data.channels.into_iter();
        let left = channels.next().unwrap_or_default();
        let right = channels.next();

        Self {
            min_note,
            max_note,
            min_velocity,
            max_velocity,
            volume: if descriptor.volume.is_finite() {
                descriptor.volume
            } else {
                0.0
            },
            pan: if descriptor.pan.is_finite() {
                descriptor.pan.clamp(-1.0, 1.0)
            } else {
                0.0
            },
            tune_cents: if descriptor.tune_cents.is_finite() {
                descriptor.tune_cents
            } else {
                0.0
            },
            root_note,
            root_frequency,
            sample_rate,
            channel_count,
            frame_count,
            is_looping: descriptor.is_looping,
            start_point: start,
            end_point: end,
            loop_start_point: loop_start,
            loop_end_point: loop_end,
            left,
            right,
        }
    }

    pub fn min_note(&self) -> u8 {
        self.min_note
    }

    pub fn max_note(&self) -> u8 {
        self.max_note
    }

    pub fn min_velocity(&self) -> u8 {
        self.min_velocity
    }

    pub fn max_velocity(&self) -> u8 {
        self.max_velocity
    }

    /// Returns true if `velocity` falls inside this region's velocity layer.
    pub fn accepts_velocity(&self, velocity: u8) -> bool {
        (self.min_velocity..=self.max_velocity).contains(&velocity)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn tune_cents(&self) -> f32 {
        self.tune_cents
    }

    pub fn root_note(&self) -> u8 {
        self.root_note
    }

    pub fn root_frequency(&self) -> f32 {
        self.root_frequency
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub fn start_point(&self) -> f64 {
        self.start_point
    }

    pub fn end_point(&self) -> f64 {
        self.end_point
    }

    pub fn loop_start_point(&self) -> f64 {
        self.loop_start_point
    }

    pub fn loop_end_point(&self) -> f64 {
        self.loop_end_point
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> Option<&[f32]> {
        self.right.as_deref()
    }

    pub fn bounds(&self) -> PlaybackBounds {
        PlaybackBounds {
            start: self.start_point,
            end: self.end_point,
            loop_start: self.loop_start_point,
            loop_end: self.loop_end_point,
        }
    }

    /// Base read increment for playing this region at `frequency` with the
    /// engine running at `output_rate`.
    pub fn increment_for(&self, frequency: f32, output_rate: f32) -> f64 {
        if output_rate <= 0.0 || self.root_frequency <= 0.0 {
            return 0.0;
        }
        (f64::from(self.sample_rate) / f64::from(output_rate))
            * (f64::from(frequency) / f64::from(self.root_frequency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent(frames: usize) -> SampleData {
        SampleData::planar(vec![vec![0.0; frames]], 44100.0)
    }

    #[test]
    fn test_loop_fractions_resolve_against_end() {
        let descriptor = RegionDescriptor {
            is_looping: true,
            loop_start_point: 0.25,
            loop_end_point: 0.75,
            ..Default::default()
        };
        let region = Region::new(&descriptor, silent(1000));

        assert_eq!(region.start_point(), 0.0);
        assert_eq!(region.end_point(), 1000.0);
        assert_eq!(region.loop_start_point(), 250.0);
        assert_eq!(region.loop_end_point(), 750.0);
    }

    #[test]
    fn test_points_are_clamped() {
        let descriptor = RegionDescriptor {
            start_point: 100.0,
            end_point: 5000.0,
            loop_start_point: 50.0,
            loop_end_point: 9000.0,
            ..Default::default()
        };
        let region = Region::new(&descriptor, silent(1000));

        assert_eq!(region.start_point(), 100.0);
        assert_eq!(region.end_point(), 1000.0);
        assert_eq!(region.loop_start_point(), 100.0);
        assert_eq!(region.loop_end_point(), 1000.0);
    }

    #[test]
    fn test_unset_loop_end_uses_end_point() {
        let descriptor = RegionDescriptor {
            end_point: 600.0,
            loop_start_point: 0.5,
            ..Default::default()
        };
        let region = Region::new(&descriptor, silent(1000));

        assert_eq!(region.loop_start_point(), 300.0);
        assert_eq!(region.loop_end_point(), 600.0);
    }

    #[test]
    fn test_fractional_end_is_floored() {
        let descriptor = RegionDescriptor {
            start_point: 20.0,
            end_point: 0.5,
            is_looping: true,
            ..Default::default()
        };
        let region = Region::new(&descriptor, silent(100));
        assert_eq!(region.start_point(), 0.0);
        assert_eq!(region.end_point(), 0.0);
        assert_eq!(region.loop_end_point(), 0.0);

        let descriptor = RegionDescriptor {
            end_point: 99.75,
            ..Default::default()
        };
        assert_eq!(Region::new(&descriptor, silent(100)).end_point(), 99.0);
    }

    #[test]
    fn test_start_past_end_is_clamped_to_end() {
        let descriptor = RegionDescriptor {
            start_point: 800.0,
            end_point: 500.0,
            ..Default::default()
        };
        let region = Region::new(&descriptor, silent(1000));
        assert_eq!(region.start_point(), 500.0);
        assert_eq!(region.end_point(), 500.0);
    }

    #[test]
    fn test_zero_length_region() {
        let region = Region::new(&RegionDescriptor::default(), silent(0));
        assert_eq!(region.frame_count(), 0);
        assert_eq!(region.end_point(), 0.0);
        assert_eq!(region.loop_end_point(), 0.0);
    }

    #[test]
    fn test_interleaved_split() {
        let data = SampleData::interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2, 48000.0);
        assert_eq!(data.frame_count(), 3);
        let region = Region::new(&RegionDescriptor::default(), data);

        assert_eq!(region.left(), &[1.0, 2.0, 3.0]);
        assert_eq!(region.right(), Some(&[-1.0, -2.0, -3.0][..]));
        assert_eq!(region.sample_rate(), 48000.0);
    }

    #[test]
    fn test_ranges_are_ordered_and_pan_clamped() {
        let descriptor = RegionDescriptor {
            min_note: 80,
            max_note: 40,
            min_velocity: 200,
            max_velocity: 10,
            pan: 4.0,
            ..Default::default()
        };
        let region = Region::new(&descriptor, silent(10));

        assert_eq!((region.min_note(), region.max_note()), (40, 80));
        assert_eq!((region.min_velocity(), region.max_velocity()), (10, 127));
        assert_eq!(region.pan(), 1.0);
    }

    #[test]
    fn test_increment() {
        let region = Region::new(
            &RegionDescriptor {
                root_note: 69,
                ..Default::default()
            },
            SampleData::planar(vec![vec![0.0; 10]], 22050.0),
        );
        assert!((region.root_frequency() - 440.0).abs() < 1e-3);
        assert!((region.increment_for(880.0, 44100.0) - 1.0).abs() < 1e-6);
    }
}
