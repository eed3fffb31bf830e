// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
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
use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand, ValueEnum};
use duration_string::DurationString;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taktinator::audio::decoder::{self, DecodeLimits};
use taktinator::audio::{Role, SampleEncoding};
use taktinator::clock::SystemClock;
use taktinator::config;
use taktinator::engine::AudioEngine;
use taktinator::metronome::Metronome;
use taktinator::program::Program;
use taktinator::util::{duration_seconds_millis, filename_display};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A metronome audio engine and rhythm sequencer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    /// 8-bit unsigned, as played through a DAC.
    U8,
    /// 16-bit signed, as played through a buffered interface.
    I16,
}

impl From<Encoding> for SampleEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::U8 => SampleEncoding::Unsigned8,
            Encoding::I16 => SampleEncoding::Signed16,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validates the header of a WAV file and prints its format.
    Probe {
        /// The WAV file.
        path: PathBuf,
    },
    /// Decodes a WAV file the way the engine would and prints the buffer.
    Decode {
        /// The WAV file.
        path: PathBuf,
        /// The stored representation to decode into.
        #[arg(short, long, value_enum, default_value = "i16")]
        encoding: Encoding,
        /// Accept 24-bit sources.
        #[arg(long)]
        allow_24_bit: bool,
    },
    /// Parses a program file and prints its steps.
    Program {
        /// The program file.
        path: PathBuf,
    },
    /// Runs the metronome.
    Run {
        /// The path to the engine config.
        config_path: PathBuf,
        /// A program to play instead of free running.
        #[arg(short, long)]
        program: Option<PathBuf>,
        /// Stop after this long, e.g. 30s.
        #[arg(short, long)]
        duration: Option<String>,
        /// Play the program once instead of looping it.
        #[arg(long)]
        no_loop: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Probe { path } => {
            let format = decoder::probe_file(&path, &DecodeLimits::default())?;
            println!("{}:", filename_display(&path));
            println!("- channels: {}", format.channels);
            println!("- sample rate: {}Hz", format.sample_rate);
            println!("- bits per sample: {}", format.bits_per_sample);
            println!("- frames: {}", format.frames);
            println!("- duration: {}", duration_seconds_millis(format.duration()));
        }
        Commands::Decode {
            path,
            encoding,
            allow_24_bit,
        } => {
            let limits = DecodeLimits {
                max_bits_per_sample: if allow_24_bit { 24 } else { 16 },
                ..DecodeLimits::default()
            };
            let buffer = decoder::decode_file(&path, encoding.into(), &limits, usize::MAX)?;
            let peak = (0..buffer.sample_count())
                .filter_map(|i| buffer.sample_i16(i))
                .map(|s| s.unsigned_abs())
                .max()
                .unwrap_or(0);

            println!("{}:", filename_display(&path));
            println!("- encoding: {}", buffer.encoding());
            println!("- bytes: {}", buffer.len());
            println!("- frames: {}", buffer.frame_count());
            println!("- duration: {}", duration_seconds_millis(buffer.duration()));
            println!("- peak: {}", peak);
        }
        Commands::Program { path } => {
            let program = Program::load(&path)?;
            if program.is_empty() {
                println!("No steps found in {}.", path.display());
                return Ok(());
            }

            println!("Steps (count: {}):", program.len());
            for (index, step) in program.steps().iter().enumerate() {
                println!("{}. {}", index + 1, step);
            }
        }
        Commands::Run {
            config_path,
            program,
            duration,
            no_loop,
        } => {
            let config = config::Engine::load(&config_path)?;
            let period = config.control_period()?;
            let limit: Option<Duration> = match duration {
                Some(duration) => Some(DurationString::from_string(duration)?.into()),
                None => None,
            };

            let mut engine = AudioEngine::from_config(&config)?;
            if !engine.select_sound_set(config.sound_set()) {
                warn!(set = config.sound_set(), "Sound set did not load completely");
            }
            if !engine.are_sounds_loaded() {
                return Err(format!(
                    "no sounds loaded, expected {} and {}",
                    engine
                        .sound_set_path(config.sound_set(), Role::Downbeat)
                        .display(),
                    engine
                        .sound_set_path(config.sound_set(), Role::Beat)
                        .display()
                )
                .into());
            }

            let mut metronome = Metronome::new(engine, SystemClock::new())
                .with_loop_programs(config.loop_programs() && !no_loop);
            match program {
                Some(path) => metronome.start_sequence(&Program::load(&path)?)?,
                None => metronome.start(),
            }

            let start = Instant::now();
            while metronome.is_playing() && limit.map_or(true, |limit| start.elapsed() < limit) {
                metronome.tick();
                spin_sleep::sleep(period);
            }
            metronome.stop();
            info!(
                elapsed = %duration_seconds_millis(start.elapsed()),
                "Finished"
            );
        }
    }

    Ok(())
}
