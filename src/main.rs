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
use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use polysampler::config::SamplerConfig;
use polysampler::samples::{Sampler, NOTE_COUNT};
use polysampler::{sfz, wav};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Frames rendered per call when writing to a file.
const RENDER_BLOCK: usize = 512;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the regions of an SFZ instrument and the key map they produce.
    Regions {
        /// The path to the SFZ file.
        sfz_path: PathBuf,
    },
    /// Renders a chord from an SFZ instrument to a stereo WAV file.
    Render {
        /// The path to the SFZ file.
        sfz_path: PathBuf,
        /// The WAV file to write.
        output_path: PathBuf,
        /// The MIDI notes to play. Should be in the form <NOTE>,<NOTE>,...
        /// For example, 60,64,67.
        #[arg[short, long, default_value = "60"]]
        notes: String,
        /// The note-on velocity.
        #[arg[short, long, default_value_t = 100]]
        velocity: u8,
        /// How long the notes are held, e.g. 1s or 250ms.
        #[arg[long, default_value = "1s"]]
        hold: String,
        /// How long to keep rendering after the notes are released.
        #[arg[short, long, default_value = "500ms"]]
        tail: String,
        /// The path to the engine config.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
}

fn parse_notes(notes: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut parsed = Vec::new();
    for note in notes.split(',') {
        let note = note.trim().parse::<u8>()?;
        if usize::from(note) >= NOTE_COUNT {
            return Err(format!("note {} is out of range", note).into());
        }
        parsed.push(note);
    }
    Ok(parsed)
}

fn frames_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize
}

/// Renders `frames` frames onto the end of the output buffers.
fn render_into(sampler: &mut Sampler, frames: usize, left: &mut Vec<f32>, right: &mut Vec<f32>) {
    let mut block_left = vec![0.0; RENDER_BLOCK];
    let mut block_right = vec![0.0; RENDER_BLOCK];
    let mut remaining = frames;
    while remaining > 0 {
        let count = remaining.min(RENDER_BLOCK);
        sampler.render(&mut block_left[..count], &mut block_right[..count]);
        left.extend_from_slice(&block_left[..count]);
        right.extend_from_slice(&block_right[..count]);
        remaining -= count;
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Regions { sfz_path } => {
            let mut sampler = Sampler::new(&SamplerConfig::default());
            sfz::load_instrument(&mut sampler, &sfz_path)?;

            if sampler.regions().is_empty() {
                println!("No regions found in {}.", sfz_path.display());
                return Ok(());
            }

            println!("Regions (count: {}):", sampler.regions().len());
            for (index, region) in sampler.regions().iter().enumerate() {
                println!(
                    "- {}: notes {}-{}, velocities {}-{}, root {}, {} frames x {} channels{}",
                    index,
                    region.min_note(),
                    region.max_note(),
                    region.min_velocity(),
                    region.max_velocity(),
                    region.root_note(),
                    region.frame_count(),
                    region.channel_count(),
                    if region.is_looping() { ", looping" } else { "" },
                );
            }

            // Collapse runs of notes that map to the same regions.
            println!("\nKey map:");
            let key_map = sampler.key_map();
            let mut start = 0u8;
            for note in 1..=NOTE_COUNT as u8 {
                let done = usize::from(note) == NOTE_COUNT;
                if done || key_map.regions_for(note) != key_map.regions_for(start) {
                    let regions = key_map.regions_for(start);
                    if !regions.is_empty() {
                        println!("- {}-{}: {:?}", start, note - 1, regions);
                    }
                    if done {
                        break;
                    }
                    start = note;
                }
            }
        }
        Commands::Render {
            sfz_path,
            output_path,
            notes,
            velocity,
            hold,
            tail,
            config,
        } => {
            let config = match config {
                Some(path) => SamplerConfig::deserialize(&path)?,
                None => SamplerConfig::default(),
            };
            let notes = parse_notes(&notes)?;
            let hold: Duration = DurationString::from_string(hold)?.into();
            let tail: Duration = DurationString::from_string(tail)?.into();

            let mut sampler = Sampler::new(&config);
            sfz::load_instrument(&mut sampler, &sfz_path)?;

            let sample_rate = config.sample_rate();
            let mut left = Vec::new();
            let mut right = Vec::new();

            for note in notes.iter() {
                sampler.note_on(*note, velocity);
            }
            render_into(&mut sampler, frames_for(hold, sample_rate), &mut left, &mut right);

            for note in notes.iter() {
                sampler.note_off(*note, false);
            }
            render_into(&mut sampler, frames_for(tail, sample_rate), &mut left, &mut right);

            wav::write_stereo_wav(&output_path, &left, &right, sample_rate)?;
            info!(
                path = %output_path.display(),
                frames = left.len(),
                sample_rate,
                "Wrote render"
            );
        }
    }

    Ok(())
}
