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

//! A reader for the `<group>`/`<region>` subset of SFZ instrument files.
//!
//! The file is tokenized by the grammar in `sfz.pest` into headers and
//! `opcode=value` pairs. Group opcodes apply to every region that follows until
//! the next group; region opcodes override them, except `tune`, `volume` and
//! `pan`, which add to the group's values. Opcodes under other headers are
//! ignored.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;
use tracing::{debug, info, span, Level};

use crate::samples::{KeyMapMode, RegionDescriptor, SampleData, Sampler};
use crate::wav;

#[derive(Parser)]
#[grammar = "src/sfz.pest"]
struct SfzParser;

#[derive(Error, Debug)]
pub enum SfzError {
    #[error("SFZ parsing error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: invalid value {value:?} for opcode {opcode}")]
    InvalidValue {
        line: usize,
        opcode: String,
        value: String,
    },
    #[error("line {line}: region has no sample")]
    MissingSample { line: usize },
    #[error("unable to decode {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// A parsed region: its tagging plus the sample file it plays.
#[derive(Clone, Debug, PartialEq)]
pub struct SfzRegion {
    descriptor: RegionDescriptor,
    sample: PathBuf,
}

impl SfzRegion {
    pub fn descriptor(&self) -> &RegionDescriptor {
        &self.descriptor
    }

    pub fn sample(&self) -> &Path {
        &self.sample
    }
}

/// Opcode values seen on one header line. Unset values fall back to the
/// enclosing group, then to SFZ defaults.
#[derive(Clone, Debug, Default)]
struct Opcodes {
    lokey: Option<u8>,
    hikey: Option<u8>,
    pitch_keycenter: Option<u8>,
    lovel: Option<u8>,
    hivel: Option<u8>,
    looping: Option<bool>,
    offset: Option<f32>,
    end: Option<f32>,
    loop_start: Option<f32>,
    loop_end: Option<f32>,
    tune: Option<f32>,
    volume: Option<f32>,
    pan: Option<f32>,
    sample: Option<String>,
}

impl Opcodes {
    /// Records one `opcode=value` pair. Unsupported opcodes are skipped.
    fn set(&mut self, opcode: &str, value: &str, line: usize) -> Result<(), SfzError> {
        let invalid = || SfzError::InvalidValue {
            line,
            opcode: opcode.to_string(),
            value: value.to_string(),
        };

        match opcode {
            "key" => {
                let key = parse_note(value).ok_or_else(invalid)?;
                self.lokey = Some(key);
                self.hikey = Some(key);
                self.pitch_keycenter = Some(key);
            }
            "lokey" => self.lokey = Some(parse_note(value).ok_or_else(invalid)?),
            "hikey" => self.hikey = Some(parse_note(value).ok_or_else(invalid)?),
            "pitch_keycenter" => {
                self.pitch_keycenter = Some(parse_note(value).ok_or_else(invalid)?)
            }
            "lovel" => self.lovel = Some(parse_midi(value).ok_or_else(invalid)?),
            "hivel" => self.hivel = Some(parse_midi(value).ok_or_else(invalid)?),
            "loop_mode" => self.looping = Some(!matches!(value, "no_loop" | "one_shot")),
            "offset" | "start" => self.offset = Some(parse_number(value).ok_or_else(invalid)?),
            "end" => self.end = Some(parse_number(value).ok_or_else(invalid)?),
            "loop_start" | "loopstart" => {
                self.loop_start = Some(parse_number(value).ok_or_else(invalid)?)
            }
            "loop_end" | "loopend" => {
                self.loop_end = Some(parse_number(value).ok_or_else(invalid)?)
            }
            "tune" => self.tune = Some(parse_number(value).ok_or_else(invalid)?),
            "volume" => self.volume = Some(parse_number(value).ok_or_else(invalid)?),
            "pan" => self.pan = Some(parse_number(value).ok_or_else(invalid)?),
            "sample" => self.sample = Some(value.replace('\\', "/")),
            _ => debug!(line, opcode, "Ignoring unsupported SFZ opcode"),
        }
        Ok(())
    }

    /// Resolves a region's opcodes against its group.
    fn into_region(
        self,
        group: &Opcodes,
        base_dir: &Path,
        line: usize,
    ) -> Result<SfzRegion, SfzError> {
        let sample = self
            .sample
            .or_else(|| group.sample.clone())
            .ok_or(SfzError::MissingSample { line })?;

        let additive = |region: Option<f32>, group: Option<f32>| {
            region.unwrap_or(0.0) + group.unwrap_or(0.0)
        };

        let descriptor = RegionDescriptor {
            root_note: self.pitch_keycenter.or(group.pitch_keycenter).unwrap_or(60),
            root_frequency: None,
            tune_cents: additive(self.tune, group.tune),
            min_note: self.lokey.or(group.lokey).unwrap_or(0),
            max_note: self.hikey.or(group.hikey).unwrap_or(127),
            min_velocity: self.lovel.or(group.lovel).unwrap_or(0),
            max_velocity: self.hivel.or(group.hivel).unwrap_or(127),
            is_looping: self.looping.or(group.looping).unwrap_or(false),
            start_point: self.offset.or(group.offset).unwrap_or(0.0),
            end_point: self.end.or(group.end).unwrap_or(0.0),
            loop_start_point: self.loop_start.or(group.loop_start).unwrap_or(0.0),
            loop_end_point: self.loop_end.or(group.loop_end).unwrap_or(0.0),
            volume: additive(self.volume, group.volume),
            pan: additive(self.pan, group.pan) / 100.0,
        };

        Ok(SfzRegion {
            descriptor,
            sample: base_dir.join(sample),
        })
    }
}

fn parse_number(value: &str) -> Option<f32> {
    value.parse::<f32>().ok().filter(|value| value.is_finite())
}

fn parse_midi(value: &str) -> Option<u8> {
    value.parse::<u8>().ok().filter(|value| *value <= 127)
}

/// Accepts MIDI note numbers or names like `c4`, `f#3` or `eb-1`, with c4 = 60.
fn parse_note(value: &str) -> Option<u8> {
    if let Some(number) = parse_midi(value) {
        return Some(number);
    }

    let lower = value.to_ascii_lowercase();
    let mut chars = lower.chars();
    let semitone: i32 = match chars.next()? {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (accidental, octave) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest),
    };

    let octave: i32 = octave.parse().ok()?;
    let note = (octave + 1) * 12 + semitone + accidental;
    u8::try_from(note).ok().filter(|note| *note <= 127)
}

/// The header currently collecting opcodes.
struct Section<'a> {
    header: &'a str,
    line: usize,
    opcodes: Opcodes,
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Parses SFZ text. Sample paths are resolved against `base_dir`.
pub fn parse(text: &str, base_dir: &Path) -> Result<Vec<SfzRegion>, SfzError> {
    let pairs = SfzParser::parse(Rule::file, text).map_err(|e| {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((line, col)) => (line, col),
            pest::error::LineColLocation::Span((line, col), _) => (line, col),
        };
        SfzError::Parse {
            line,
            column,
            message: e.variant.message().to_string(),
        }
    })?;

    let mut group = Opcodes::default();
    let mut regions = Vec::new();
    let mut section: Option<Section> = None;

    for pair in pairs.flat_map(|file| file.into_inner()) {
        match pair.as_rule() {
            Rule::header => {
                if let Some(finished) = section.take() {
                    close_section(finished, &mut group, &mut regions, base_dir)?;
                }
                let line = line_of(&pair);
                let header = pair
                    .into_inner()
                    .next()
                    .map_or("", |name| name.as_str());
                section = Some(Section {
                    header,
                    line,
                    opcodes: Opcodes::default(),
                });
            }
            Rule::opcode => {
                let line = line_of(&pair);
                let mut inner = pair.into_inner();
                let (Some(opcode), Some(value)) = (inner.next(), inner.next()) else {
                    continue;
                };
                match section.as_mut() {
                    Some(section) => {
                        section
                            .opcodes
                            .set(opcode.as_str(), value.as_str(), line)?
                    }
                    None => debug!(
                        line,
                        opcode = opcode.as_str(),
                        "Skipping opcode outside a header"
                    ),
                }
            }
            _ => {
                // EOI
            }
        }
    }

    if let Some(finished) = section {
        close_section(finished, &mut group, &mut regions, base_dir)?;
    }

    Ok(regions)
}

fn close_section(
    section: Section<'_>,
    group: &mut Opcodes,
    regions: &mut Vec<SfzRegion>,
    base_dir: &Path,
) -> Result<(), SfzError> {
    let line = section.line;
    match section.header {
        "group" => *group = section.opcodes,
        "region" => {
            let region = section.opcodes.into_region(group, base_dir, line)?;
            debug!(
                line,
                sample = %region.sample.display(),
                min_note = region.descriptor.min_note,
                max_note = region.descriptor.max_note,
                "Parsed SFZ region"
            );
            regions.push(region);
        }
        header => debug!(line, header, "Skipping unsupported SFZ header"),
    }
    Ok(())
}

/// Reads and parses an SFZ file. Sample paths are relative to its directory.
pub fn load(path: &Path) -> Result<Vec<SfzRegion>, SfzError> {
    let text = fs::read_to_string(path).map_err(|source| SfzError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse(&text, base_dir)
}

/// Loads every region of an SFZ file into the sampler and builds an explicit
/// range key map. Returns the number of regions loaded.
pub fn load_instrument(sampler: &mut Sampler, path: &Path) -> Result<usize, SfzError> {
    let span = span!(Level::INFO, "load instrument", path = %path.display());
    let _enter = span.enter();

    let regions = load(path)?;
    let mut decoded: HashMap<PathBuf, SampleData> = HashMap::new();

    for region in &regions {
        let data = match decoded.get(&region.sample) {
            Some(data) => data.clone(),
            None => {
                let data = wav::read_wav(&region.sample).map_err(|source| SfzError::Wav {
                    path: region.sample.clone(),
                    source,
                })?;
                decoded.insert(region.sample.clone(), data.clone());
                data
            }
        };
        sampler.load_region(&region.descriptor, data);
    }

    sampler.build_key_map(KeyMapMode::ExplicitRange);
    info!(
        regions = regions.len(),
        samples = decoded.len(),
        "Loaded instrument"
    );
    Ok(regions.len())
}
