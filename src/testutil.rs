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

use std::{
    error::Error,
    path::Path,
    thread,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::config::SamplerConfig;
use crate::samples::{RegionDescriptor, SampleData, Sampler};

/// Audio test utilities for generating test signals and validating results
pub mod audio_test_utils {
    use std::f32::consts::PI;

    /// Generate a sine wave of the given length in frames.
    pub fn generate_sine(
        frequency: f32,
        amplitude: f32,
        sample_rate: u32,
        frames: usize,
    ) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Calculate RMS (Root Mean Square) of a signal
    pub fn calculate_rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }
}

/// Mono data holding a constant value, handy for checking gain math.
pub fn constant_data(frames: usize, value: f32, sample_rate: u32) -> SampleData {
    SampleData::planar(vec![vec![value; frames]], sample_rate as f32)
}

/// A full-range looping region rooted at `root_note`.
pub fn looping_region(root_note: u8) -> RegionDescriptor {
    RegionDescriptor {
        root_note,
        is_looping: true,
        ..Default::default()
    }
}

/// A sampler running at 1 kHz with 10-frame chunks, so one chunk is 10 ms.
pub fn test_sampler(polyphony: usize) -> Sampler {
    Sampler::new(&SamplerConfig::new(1000, 10, polyphony))
}

/// A test sampler with one constant looping region mapped to every note.
pub fn loaded_sampler(polyphony: usize) -> Sampler {
    let mut sampler = test_sampler(polyphony);
    sampler.load_region(&looping_region(60), constant_data(10_000, 0.5, 1000));
    sampler.rebuild_key_map();
    sampler
}

/// Renders `frames` frames and returns the left and right output.
pub fn render_frames(sampler: &mut Sampler, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];
    sampler.render(&mut left, &mut right);
    (left, right)
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// Writes interleaved 32-bit float frames to a WAV file.
pub fn write_wav(
    path: &Path,
    channels: &[Vec<f32>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    assert!(channels.len() <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}
