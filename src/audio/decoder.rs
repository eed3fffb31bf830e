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

//! WAV decoding into the device's playback representation.
//!
//! Samples are streamed out of the reader and converted one at a time, so a clip
//! never exists twice in memory. The memory check runs on the header alone.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec};
use tracing::{debug, warn};

use super::buffer::{AudioBuffer, SampleEncoding, U8_CENTER};
use super::error::{DecodeError, FormatError};

/// Default headroom left on the heap for the UI and stacks.
pub const DEFAULT_SAFETY_MARGIN: usize = 40_000;

/// Default highest accepted sample rate. Anything above would need resampling.
pub const DEFAULT_MAX_SAMPLE_RATE: u32 = 48_000;

/// Default highest accepted source bit depth.
pub const DEFAULT_MAX_BITS_PER_SAMPLE: u16 = 16;

/// What the decoder is willing to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_sample_rate: u32,
    pub max_bits_per_sample: u16,
    /// Bytes that must stay free after the buffer has been allocated.
    pub safety_margin: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits {
            max_sample_rate: DEFAULT_MAX_SAMPLE_RATE,
            max_bits_per_sample: DEFAULT_MAX_BITS_PER_SAMPLE,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

/// The parts of a WAV header the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Frames the data chunk declares.
    pub frames: u32,
}

impl WavFormat {
    fn of<R: Read>(reader: &WavReader<R>) -> Self {
        let spec = reader.spec();
        WavFormat {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            frames: reader.duration(),
        }
    }

    /// Width of one source sample in bytes.
    pub fn sample_width(&self) -> usize {
        usize::from(self.bits_per_sample).div_ceil(8)
    }

    /// Width of one source frame in bytes.
    fn frame_width(&self) -> usize {
        self.sample_width() * usize::from(self.channels)
    }

    /// Play time of the declared frames.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frames) * 1000 / u64::from(self.sample_rate.max(1)))
    }
}

/// Checks the format against what the device can play.
fn validate(spec: &WavSpec, limits: &DecodeLimits) -> Result<(), FormatError> {
    if spec.sample_format != SampleFormat::Int {
        return Err(FormatError::UnsupportedCodec);
    }
    if spec.sample_rate == 0 || spec.sample_rate > limits.max_sample_rate {
        return Err(FormatError::UnsupportedSampleRate(spec.sample_rate));
    }
    if spec.bits_per_sample > limits.max_bits_per_sample
        || !matches!(spec.bits_per_sample, 8 | 16 | 24)
    {
        return Err(FormatError::UnsupportedBitDepth(spec.bits_per_sample));
    }
    if !(1..=2).contains(&spec.channels) {
        return Err(FormatError::UnsupportedChannels(spec.channels));
    }
    Ok(())
}

fn wav_error(e: hound::Error) -> DecodeError {
    match e {
        hound::Error::FormatError(reason) => FormatError::Invalid(reason).into(),
        hound::Error::Unsupported => FormatError::UnsupportedCodec.into(),
        // The stream ran out while hound was still looking for the data chunk.
        hound::Error::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            FormatError::MissingDataChunk.into()
        }
        hound::Error::IoError(e) => DecodeError::Io(e),
        other => DecodeError::Wav(other),
    }
}

/// Reads the header and rejects anything the device can't play.
fn open<R: Read>(reader: R, limits: &DecodeLimits) -> Result<WavReader<R>, DecodeError> {
    let wav = WavReader::new(reader).map_err(wav_error)?;
    let spec = wav.spec();
    debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        format = ?spec.sample_format,
        "WAV format"
    );
    validate(&spec, limits)?;
    Ok(wav)
}

/// Validates the headers of a WAV stream without decoding any samples.
pub fn probe<R: Read>(reader: R, limits: &DecodeLimits) -> Result<WavFormat, DecodeError> {
    open(reader, limits).map(|wav| WavFormat::of(&wav))
}

/// Validates the headers of a WAV file without decoding any samples.
pub fn probe_file(path: &Path, limits: &DecodeLimits) -> Result<WavFormat, DecodeError> {
    probe(BufReader::new(File::open(path)?), limits)
}

/// Number of bytes left in the stream from the current position.
fn remaining_len<R: Seek>(reader: &mut R) -> io::Result<u64> {
    let position = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(position))?;
    Ok(end.saturating_sub(position))
}

/// Size in bytes of the stored buffer for `frames` frames of the given format.
pub fn target_len(format: &WavFormat, frames: usize, target: SampleEncoding) -> usize {
    frames * usize::from(format.channels) * target.width()
}

/// Decodes a WAV stream into the given stored representation.
///
/// `free_heap` is the number of bytes currently free; the decode fails with
/// [`DecodeError::OutOfMemory`] if the converted buffer would eat into the safety margin.
pub fn decode<R: Read + Seek>(
    reader: &mut R,
    target: SampleEncoding,
    limits: &DecodeLimits,
    free_heap: usize,
) -> Result<AudioBuffer, DecodeError> {
    let stream_len = remaining_len(reader)?;
    let mut wav = open(&mut *reader, limits)?;
    let format = WavFormat::of(&wav);

    // A data chunk can't hold more frames than the whole stream.
    let present = usize::try_from(stream_len).unwrap_or(usize::MAX) / format.frame_width();
    let frames = usize::try_from(format.frames)
        .unwrap_or(usize::MAX)
        .min(present);
    let required = target_len(&format, frames, target);
    let available = free_heap.saturating_sub(limits.safety_margin);
    if required > available {
        return Err(DecodeError::OutOfMemory {
            required,
            available,
        });
    }

    let mut out: Vec<u8> = Vec::new();
    out.try_reserve_exact(required)
        .map_err(|_| DecodeError::OutOfMemory {
            required,
            available,
        })?;

    let bits = format.bits_per_sample;
    let channels = usize::from(format.channels);
    let mut decoded = 0;
    for sample in wav.samples::<i32>().take(frames * channels) {
        let sample = match sample {
            Ok(sample) => sample,
            Err(hound::Error::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(
                    declared = format.frames,
                    decoded = decoded / channels,
                    "Data chunk is truncated, decoding what is present"
                );
                break;
            }
            Err(e) => return Err(wav_error(e)),
        };
        match target {
            SampleEncoding::Unsigned8 => out.push(to_unsigned8(sample, bits)),
            SampleEncoding::Signed16 => out.extend_from_slice(&to_signed16(sample, bits).to_le_bytes()),
        }
        decoded += 1;
    }

    // A truncated stream can end mid-frame.
    out.truncate((decoded - decoded % channels) * target.width());
    Ok(AudioBuffer::new(out, format.sample_rate, format.channels, target))
}

/// Decodes a WAV file into the given stored representation.
pub fn decode_file(
    path: &Path,
    target: SampleEncoding,
    limits: &DecodeLimits,
    free_heap: usize,
) -> Result<AudioBuffer, DecodeError> {
    decode(&mut BufReader::new(File::open(path)?), target, limits, free_heap)
}

/// Converts one signed source sample of `bits` width to 8-bit unsigned.
fn to_unsigned8(sample: i32, bits: u16) -> u8 {
    let shift = u32::from(bits.saturating_sub(8));
    ((sample >> shift) + i32::from(U8_CENTER)) as u8
}

/// Converts one signed source sample of `bits` width to 16-bit signed. 24-bit
/// sources lose their least significant byte.
fn to_signed16(sample: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}
