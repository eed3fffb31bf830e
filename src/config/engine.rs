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
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::decoder::{
    DecodeLimits, DEFAULT_MAX_BITS_PER_SAMPLE, DEFAULT_MAX_SAMPLE_RATE, DEFAULT_SAFETY_MARGIN,
};

const DEFAULT_SOUND_SET: &str = "Metro";
const DEFAULT_CONTROL_PERIOD: Duration = Duration::from_millis(1);
const DEFAULT_HEAP_BUDGET: usize = 160_000;
/// About 100ms of 44.1kHz audio.
const DEFAULT_OUTPUT_QUEUE: usize = 4096;

/// Which playback strategy drives the output.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// One 8-bit sample per timer interrupt to a DAC.
    Interrupt,
    /// Chunked 16-bit transfers to a buffered interface.
    #[default]
    Bulk,
    /// No audio hardware at all.
    Mock,
}

/// Memory available to audio buffers.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Memory {
    heap_budget: Option<usize>,
    safety_margin: Option<usize>,
}

/// What the decoder accepts.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Decode {
    max_sample_rate: Option<u32>,
    max_bits_per_sample: Option<u16>,
}

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The playback strategy (default: bulk).
    output: Option<OutputKind>,

    /// Directory holding `<set>_Downbeat.wav` and `<set>_Beat.wav` files.
    sound_dir: Option<PathBuf>,

    /// The sound set loaded at startup (default: Metro).
    sound_set: Option<String>,

    /// Initial volume, 0-255 (default: 255).
    volume: Option<u8>,

    /// Whether started programs loop (default: true).
    loop_programs: Option<bool>,

    /// How often the control loop polls the beat clock (default: 1ms).
    control_period: Option<String>,

    /// Samples the host output queue holds before bulk transfers block.
    output_queue: Option<usize>,

    memory: Option<Memory>,

    decode: Option<Decode>,
}

impl Engine {
    /// Reads the engine configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Engine, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?)
    }

    /// A configuration that plays into the mock output.
    pub fn mock() -> Engine {
        Engine {
            output: Some(OutputKind::Mock),
            ..Default::default()
        }
    }

    pub fn output(&self) -> OutputKind {
        self.output.unwrap_or_default()
    }

    pub fn sound_dir(&self) -> &Path {
        self.sound_dir.as_deref().unwrap_or(Path::new("."))
    }

    pub fn sound_set(&self) -> &str {
        self.sound_set.as_deref().unwrap_or(DEFAULT_SOUND_SET)
    }

    pub fn volume(&self) -> u8 {
        self.volume.unwrap_or(u8::MAX)
    }

    pub fn loop_programs(&self) -> bool {
        self.loop_programs.unwrap_or(true)
    }

    /// Returns the control loop period. Must stay well below the shortest beat interval.
    pub fn control_period(&self) -> Result<Duration, ConfigError> {
        match &self.control_period {
            Some(period) => Ok(DurationString::from_string(period.clone())
                .map_err(|e| ConfigError::Duration {
                    field: "control_period",
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_CONTROL_PERIOD),
        }
    }

    pub fn output_queue(&self) -> usize {
        self.output_queue.unwrap_or(DEFAULT_OUTPUT_QUEUE).max(1)
    }

    /// Bytes of heap the audio buffers may use, safety margin included.
    pub fn heap_budget(&self) -> usize {
        self.memory
            .as_ref()
            .and_then(|memory| memory.heap_budget)
            .unwrap_or(DEFAULT_HEAP_BUDGET)
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        let memory = self.memory.clone().unwrap_or_default();
        let decode = self.decode.clone().unwrap_or_default();
        DecodeLimits {
            max_sample_rate: decode.max_sample_rate.unwrap_or(DEFAULT_MAX_SAMPLE_RATE),
            max_bits_per_sample: decode
                .max_bits_per_sample
                .unwrap_or(DEFAULT_MAX_BITS_PER_SAMPLE),
            safety_margin: memory.safety_margin.unwrap_or(DEFAULT_SAFETY_MARGIN),
        }
    }
}
