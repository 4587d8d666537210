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

//! WAV decoding into region sample data and stereo output writing.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::samples::SampleData;

/// Decodes a WAV file, normalizing integer formats to [-1, 1].
pub fn read_wav(path: &Path) -> Result<SampleData, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    debug!(
        path = %path.display(),
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        "Decoded sample file"
    );

    Ok(SampleData::interleaved(
        &samples,
        usize::from(spec.channels),
        spec.sample_rate as f32,
    ))
}

/// Writes a stereo pair of buffers as 32-bit float WAV.
pub fn write_stereo_wav(
    path: &Path,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    for (l, r) in left.iter().zip(right) {
        writer.write_sample(*l)?;
        writer.write_sample(*r)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use hound::{SampleFormat, WavSpec, WavWriter};

    use super::{read_wav, write_stereo_wav};
    use crate::samples::{Region, RegionDescriptor};
    use crate::testutil::{audio_test_utils::generate_sine, write_wav};

    #[test]
    fn read_float_stereo() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stereo.wav");
        let left = generate_sine(440.0, 0.5, 44100, 1000);
        let right = vec![0.25; 1000];
        write_wav(&path, &[left.clone(), right.clone()], 44100)?;

        let data = read_wav(&path)?;
        assert_eq!(2, data.channel_count());
        assert_eq!(1000, data.frame_count());
        assert_eq!(44100.0, data.sample_rate());
        Ok(())
    }

    #[test]
    fn read_int16_is_normalized() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mono16.wav");
        let mut writer = WavWriter::create(
            &path,
            WavSpec {
                channels: 1,
                sample_rate: 22050,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;
        for value in [i16::MAX, 0, i16::MIN, 16384] {
            writer.write_sample(value)?;
        }
        writer.finalize()?;

        let data = read_wav(&path)?;
        assert_eq!(1, data.channel_count());
        assert_eq!(4, data.frame_count());
        assert_eq!(22050.0, data.sample_rate());

        let region = Region::new(&RegionDescriptor::default(), data);
        assert!((region.left()[0] - 1.0).abs() < 1e-4);
        assert_eq!(0.0, region.left()[1]);
        assert_eq!(-1.0, region.left()[2]);
        assert_eq!(0.5, region.left()[3]);
        Ok(())
    }

    #[test]
    fn stereo_output_round_trip() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.wav");
        write_stereo_wav(&path, &[0.5, -0.5, 0.25], &[0.1, 0.2, 0.3], 48000)?;

        let reader = hound::WavReader::open(&path)?;
        assert_eq!(2, reader.spec().channels);
        assert_eq!(48000, reader.spec().sample_rate);
        let samples = reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(vec![0.5, 0.1, -0.5, 0.2, 0.25, 0.3], samples);
        Ok(())
    }
}
