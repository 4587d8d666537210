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

use std::path::Path;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ConfigError;
use crate::dsp::{AdsrParameters, AhdshrParameters};
use crate::samples::KeyMapMode;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default number of frames per render chunk. Envelopes and LFOs advance once per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// Default size of the voice pool.
pub const DEFAULT_POLYPHONY: usize = 64;

const MAX_CHUNK_SIZE: usize = 4096;
const MAX_POLYPHONY: usize = 1024;

/// Continuous parameters read by the render loop.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SamplerParameters {
    /// Linear gain applied to every voice.
    pub master_volume: f32,
    /// Output gain in decibels, applied after mixing.
    pub overall_gain: f32,
    /// Output pan in [-1, 1], applied after mixing.
    pub overall_pan: f32,
    /// Pitch offset in semitones.
    pub pitch_offset: f32,
    /// Depth in semitones of the vibrato shared by all voices.
    pub vibrato_depth: f32,
    pub vibrato_frequency: f32,
    /// Depth in semitones of each voice's own vibrato.
    pub voice_vibrato_depth: f32,
    pub voice_vibrato_frequency: f32,
    pub lfo_rate: f32,
    pub lfo_depth: f32,
    pub lfo_target_pitch: bool,
    pub lfo_target_gain: bool,
    pub lfo_target_filter: bool,
    pub is_monophonic: bool,
    pub is_legato: bool,
    /// Portamento time in seconds per octave. Zero disables glide.
    pub glide_rate: f32,
    /// Cutoff as a multiple of the note frequency. Negative disables the filter.
    pub cutoff_multiple: f32,
    pub key_tracking: f32,
    pub cutoff_envelope_strength: f32,
    pub filter_envelope_velocity_scaling: f32,
    pub linear_resonance: f32,
    /// Pitch envelope depth in semitones.
    pub pitch_envelope_semitones: f32,
    /// Keep looping through the release stage.
    pub loop_thru_release: bool,
    /// Reset each voice's vibrato phase on every new note.
    pub restart_voice_lfo: bool,
}

impl Default for SamplerParameters {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            overall_gain: 0.0,
            overall_pan: 0.0,
            pitch_offset: 0.0,
            vibrato_depth: 0.0,
            vibrato_frequency: 5.0,
            voice_vibrato_depth: 0.0,
            voice_vibrato_frequency: 5.0,
            lfo_rate: 5.0,
            lfo_depth: 0.0,
            lfo_target_pitch: false,
            lfo_target_gain: false,
            lfo_target_filter: false,
            is_monophonic: false,
            is_legato: false,
            glide_rate: 0.0,
            cutoff_multiple: 4.0,
            key_tracking: 1.0,
            cutoff_envelope_strength: 20.0,
            filter_envelope_velocity_scaling: 0.0,
            linear_resonance: 0.5,
            pitch_envelope_semitones: 0.0,
            loop_thru_release: false,
            restart_voice_lfo: false,
        }
    }
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_polyphony() -> usize {
    DEFAULT_POLYPHONY
}

/// A YAML representation of the sampler engine settings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SamplerConfig {
    /// The output sample rate.
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// Frames per render chunk.
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,

    /// Number of voices in the pool.
    #[serde(default = "default_polyphony")]
    polyphony: usize,

    /// How notes are mapped to regions.
    #[serde(default)]
    key_map: KeyMapMode,

    #[serde(default)]
    amp_envelope: AhdshrParameters,

    #[serde(default)]
    filter_envelope: AdsrParameters,

    #[serde(default)]
    pitch_envelope: AdsrParameters,

    #[serde(default)]
    parameters: SamplerParameters,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHUNK_SIZE, DEFAULT_POLYPHONY)
    }
}

impl SamplerConfig {
    /// Creates a new sampler configuration with default parameters.
    pub fn new(sample_rate: u32, chunk_size: usize, polyphony: usize) -> SamplerConfig {
        SamplerConfig {
            sample_rate,
            chunk_size,
            polyphony,
            key_map: KeyMapMode::default(),
            amp_envelope: AhdshrParameters::default(),
            filter_envelope: AdsrParameters::default(),
            pitch_envelope: AdsrParameters::default(),
            parameters: SamplerParameters::default(),
        }
    }

    /// Parse a sampler configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<SamplerConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SamplerConfig>()?
            .validate()?;
        info!(
            path = ?path,
            sample_rate = config.sample_rate,
            chunk_size = config.chunk_size,
            polyphony = config.polyphony,
            "Loaded sampler config"
        );
        Ok(config)
    }

    /// Parse a sampler configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<SamplerConfig, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<SamplerConfig>()?
            .validate()
    }

    fn validate(self) -> Result<SamplerConfig, ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.polyphony == 0 || self.polyphony > MAX_POLYPHONY {
            return Err(ConfigError::Invalid(format!(
                "polyphony must be between 1 and {}, got {}",
                MAX_POLYPHONY, self.polyphony
            )));
        }
        Ok(self)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    pub fn key_map(&self) -> KeyMapMode {
        self.key_map
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

    pub fn parameters(&self) -> &SamplerParameters {
        &self.parameters
    }

    /// Replaces the continuous parameters.
    pub fn with_parameters(mut self, parameters: SamplerParameters) -> SamplerConfig {
        self.parameters = parameters;
        self
    }

    /// Replaces the amplitude envelope.
    pub fn with_amp_envelope(mut self, amp_envelope: AhdshrParameters) -> SamplerConfig {
        self.amp_envelope = amp_envelope;
        self
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let config = SamplerConfig::from_yaml_str("{}")?;
        assert_eq!(config, SamplerConfig::default());
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.chunk_size(), 16);
        assert_eq!(config.polyphony(), 64);
        assert_eq!(config.key_map(), KeyMapMode::NearestPitch);

        let parameters = config.parameters();
        assert_eq!(parameters.master_volume, 1.0);
        assert_eq!(parameters.cutoff_multiple, 4.0);
        assert_eq!(parameters.key_tracking, 1.0);
        assert_eq!(parameters.cutoff_envelope_strength, 20.0);
        assert_eq!(parameters.linear_resonance, 0.5);
        assert_eq!(parameters.vibrato_frequency, 5.0);
        assert_eq!(parameters.lfo_rate, 5.0);
        assert_eq!(parameters.glide_rate, 0.0);
        Ok(())
    }

    #[test]
    fn partial_overrides() -> Result<(), Box<dyn Error>> {
        let config = SamplerConfig::from_yaml_str(
            r#"
            sample_rate: 48000
            polyphony: 8
            key_map: explicit_range
            amp_envelope:
              attack_seconds: 0.01
              release_seconds: 0.5
            parameters:
              is_monophonic: true
              glide_rate: 0.25
        "#,
        )?;

        assert_eq!(config.sample_rate(), 48000);
        assert_eq!(config.chunk_size(), 16);
        assert_eq!(config.polyphony(), 8);
        assert_eq!(config.key_map(), KeyMapMode::ExplicitRange);
        assert_eq!(config.amp_envelope().attack_seconds, 0.01);
        assert_eq!(config.amp_envelope().release_seconds, 0.5);
        assert_eq!(config.amp_envelope().sustain_fraction, 1.0);
        assert!(config.parameters().is_monophonic);
        assert_eq!(config.parameters().glide_rate, 0.25);
        assert_eq!(config.parameters().cutoff_multiple, 4.0);
        Ok(())
    }

    #[test]
    fn invalid_values() {
        assert!(matches!(
            SamplerConfig::from_yaml_str("chunk_size: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SamplerConfig::from_yaml_str("polyphony: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SamplerConfig::from_yaml_str("sample_rate: 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SamplerConfig::from_yaml_str("polyphony: lots"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn from_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "chunk_size: 32")?;
        writeln!(file, "parameters:")?;
        writeln!(file, "  overall_gain: -6.0")?;
        drop(file);

        let config = SamplerConfig::deserialize(&path)?;
        assert_eq!(config.chunk_size(), 32);
        assert_eq!(config.parameters().overall_gain, -6.0);
        Ok(())
    }

    #[test]
    fn missing_file() {
        let result = SamplerConfig::deserialize(Path::new("/nonexistent/engine.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
