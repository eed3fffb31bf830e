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
use super::buffer::SampleEncoding;

/// The file is not a WAV file the device can play.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Not a valid WAV file: {0}")]
    Invalid(&'static str),

    #[error("Unsupported codec, must be linear integer PCM")]
    UnsupportedCodec,

    #[error("Sample rate {0}Hz is too high")]
    UnsupportedSampleRate(u32),

    #[error("{0} bits per sample is not supported")]
    UnsupportedBitDepth(u16),

    #[error("{0} channels is not supported, must be 1 or 2")]
    UnsupportedChannels(u16),

    #[error("Stream ended before the data chunk")]
    MissingDataChunk,
}

/// Error types for decoding a clip into an audio buffer. Every variant is recoverable:
/// the buffer that was loaded before the failed attempt stays in place.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Not enough memory: {required} bytes required, {available} available")]
    OutOfMemory { required: usize, available: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(hound::Error),
}

/// Errors reported by an output peripheral.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Output device is gone")]
    Disconnected,

    #[error("Output device error: {0}")]
    Device(String),
}

/// Errors from handing a buffer to a playback driver.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Buffer is {buffer} but the driver plays {driver}")]
    EncodingMismatch {
        buffer: SampleEncoding,
        driver: SampleEncoding,
    },

    #[error(transparent)]
    Output(#[from] OutputError),
}
