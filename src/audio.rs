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
use std::{fmt, sync::Arc};

use tracing::info;

use crate::config::{self, OutputKind};
use crate::engine::EngineError;

pub mod buffer;
pub mod chunked;
pub mod cpal;
pub mod decoder;
pub mod error;
pub mod interrupt;
pub mod mock;
pub mod store;
pub mod thread_priority;
pub mod timer;

pub use buffer::{AudioBuffer, SampleEncoding};
pub use error::{DecodeError, FormatError, OutputError, PlaybackError};
pub use store::AudioBufferStore;

/// Which of the two clips a buffer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The accented first beat of a bar.
    Downbeat,
    /// Every other beat.
    Beat,
}

impl Role {
    /// The file name suffix used by sound sets, e.g. `Metro_Downbeat.wav`.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Role::Downbeat => "_Downbeat.wav",
            Role::Beat => "_Beat.wav",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Downbeat => "downbeat",
            Role::Beat => "beat",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hands decoded buffers to an output peripheral. There are two strategies: the
/// interrupt pusher for a directly driven DAC and the chunked pusher for a buffered
/// digital interface. One is picked at startup and never switched.
pub trait PlaybackDriver: Send {
    /// The stored representation this driver plays.
    fn encoding(&self) -> SampleEncoding;

    /// Starts playing the given buffer from its beginning, cutting off anything
    /// that is still playing.
    fn play(&mut self, buffer: &Arc<AudioBuffer>) -> Result<(), PlaybackError>;

    /// Sets the output volume, 0 to 255.
    fn set_volume(&mut self, volume: u8);

    fn volume(&self) -> u8;

    /// Returns true while a clip is still being pushed out.
    fn is_playing(&self) -> bool;
}

/// Builds the playback driver selected by the configuration. Failing to find an
/// output peripheral is the only fatal engine error.
pub fn get_driver(config: &config::Engine) -> Result<Box<dyn PlaybackDriver>, EngineError> {
    let driver: Box<dyn PlaybackDriver> = match config.output() {
        OutputKind::Mock => {
            info!("Using mock output");
            Box::new(chunked::ChunkedPusher::new(mock::MockBulkOutput::counting()))
        }
        OutputKind::Bulk => {
            let output = cpal::CpalOutput::open(config.output_queue())
                .map_err(|e| EngineError::NoOutputDevice(e.to_string()))?;
            info!(channels = output.channels(), "Using chunked transfer output");
            Box::new(chunked::ChunkedPusher::new(output.bulk()))
        }
        OutputKind::Interrupt => {
            let output = cpal::CpalOutput::open(config.output_queue())
                .map_err(|e| EngineError::NoOutputDevice(e.to_string()))?;
            info!(channels = output.channels(), "Using interrupt clocked output");
            Box::new(timer::TimerDrivenPusher::new(output.dac()))
        }
    };

    Ok(driver)
}
