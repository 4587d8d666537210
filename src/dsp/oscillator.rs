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

/// Where a region's playable material lives, in frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackBounds {
    pub start: f64,
    /// Exclusive end of playback.
    pub end: f64,
    pub loop_start: f64,
    pub loop_end: f64,
}

/// A fractional read cursor over a region's sample data.
#[derive(Debug, Clone, Default)]
pub struct SampleOscillator {
    index: f64,
    increment: f64,
    multiplier: f64,
    is_looping: bool,
}

impl SampleOscillator {
    /// Places the cursor at `index` with the given base increment (frames per output sample).
    pub fn reset(&mut self, index: f64, increment: f64, is_looping: bool) {
        self.index = index;
        self.increment = increment;
        self.multiplier = 1.0;
        self.is_looping = is_looping;
    }

    pub fn set_increment(&mut self, increment: f64) {
        self.increment = increment;
    }

    pub fn set_looping(&mut self, is_looping: bool) {
        self.is_looping = is_looping;
    }

    /// Frames advanced per output sample, pitch offset included.
    pub fn playback_rate(&self) -> f64 {
        self.increment * self.multiplier
    }

    /// Scales playback speed by a pitch offset in semitones.
    pub fn set_pitch_offset_semitones(&mut self, semitones: f32) {
        self.multiplier = 2.0_f64.powf(f64::from(semitones) / 12.0);
    }

    /// Reads one interpolated stereo pair and advances the cursor.
    ///
    /// Mono data is duplicated to both sides. Returns `None` once the cursor is
    /// past the end of a non-looping region.
    pub fn next_pair(
        &mut self,
        left: &[f32],
        right: Option<&[f32]>,
        bounds: &PlaybackBounds,
        gain: f32,
    ) -> Option<(f32, f32)> {
        let loop_length = bounds.loop_end - bounds.loop_start;
        if self.is_looping && loop_length > 0.0 && self.index >= bounds.loop_end {
            self.index = bounds.loop_start + (self.index - bounds.loop_start) % loop_length;
        }

        let end = bounds.end.floor().min(left.len() as f64);
        if end < 1.0 || self.index >= end || self.index < 0.0 {
            return None;
        }

        let last = (end as usize).saturating_sub(1);
        let position = self.index as usize;
        let next = (position + 1).min(last);
        let fraction = (self.index - position as f64) as f32;

        let interpolate = |data: &[f32]| {
            let a = data.get(position).copied().unwrap_or(0.0);
            let b = data.get(next).copied().unwrap_or(a);
            a + (b - a) * fraction
        };

        let l = interpolate(left);
        let r = match right {
            Some(right) => interpolate(right),
            None => l,
        };

        self.index += self.increment * self.multiplier;
        Some((l * gain, r * gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(end: f64, loop_start: f64, loop_end: f64) -> PlaybackBounds {
        PlaybackBounds {
            start: 0.0,
            end,
            loop_start,
            loop_end,
        }
    }

    #[test]
    fn test_interpolates_between_frames() {
        let data = [0.0, 1.0, 2.0, 3.0];
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 0.5, false);

        let values: Vec<f32> = (0..4)
            .filter_map(|_| oscillator.next_pair(&data, None, &bounds(4.0, 0.0, 4.0), 1.0))
            .map(|(l, _)| l)
            .collect();
        assert_eq!(values, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_stops_at_end_when_not_looping() {
        let data = [1.0; 4];
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 1.0, false);

        let count = (0..10)
            .map_while(|_| oscillator.next_pair(&data, None, &bounds(4.0, 0.0, 4.0), 1.0))
            .count();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_wraps_inside_loop() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 1.0, true);

        let values: Vec<f32> = (0..8)
            .filter_map(|_| oscillator.next_pair(&data, None, &bounds(6.0, 2.0, 4.0), 1.0))
            .map(|(l, _)| l)
            .collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 2.0, 3.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pitch_offset_doubles_speed() {
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 1.0, false);
        oscillator.set_pitch_offset_semitones(12.0);

        let data = [0.0, 1.0, 2.0, 3.0];
        let stereo = [10.0, 11.0, 12.0, 13.0];
        let first = oscillator.next_pair(&data, Some(&stereo), &bounds(4.0, 0.0, 4.0), 0.5);
        let second = oscillator.next_pair(&data, Some(&stereo), &bounds(4.0, 0.0, 4.0), 0.5);
        assert_eq!(first, Some((0.0, 5.0)));
        assert_eq!(second, Some((1.0, 6.0)));
    }

    #[test]
    fn test_end_below_one_frame_is_silent() {
        let data = [1.0; 100];
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 1.0, false);
        assert!(oscillator
            .next_pair(&data, None, &bounds(0.5, 0.0, 0.5), 1.0)
            .is_none());

        oscillator.reset(0.0, 1.0, true);
        assert!(oscillator
            .next_pair(&data, None, &bounds(0.5, 0.0, 0.5), 1.0)
            .is_none());
    }

    #[test]
    fn test_playback_rate_includes_pitch_offset() {
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 0.5, false);
        assert_eq!(oscillator.playback_rate(), 0.5);
        oscillator.set_pitch_offset_semitones(-12.0);
        assert!((oscillator.playback_rate() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_empty_data_is_silent() {
        let mut oscillator = SampleOscillator::default();
        oscillator.reset(0.0, 1.0, true);
        assert!(oscillator
            .next_pair(&[], None, &bounds(0.0, 0.0, 0.0), 1.0)
            .is_none());
    }
}
