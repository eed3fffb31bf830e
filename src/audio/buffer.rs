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

//! Decoded, playback-ready sample storage.

use std::fmt;
use std::time::Duration;

/// The center value of an unsigned 8-bit sample. Written to the DAC for silence.
pub const U8_CENTER: u8 = 128;

/// The stored representation of a decoded buffer. Which one is used depends on the
/// playback strategy: the direct DAC wants unsigned bytes, the buffered digital
/// interface wants signed 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 8-bit unsigned PCM, centered at 128.
    Unsigned8,
    /// 16-bit signed little-endian PCM.
    Signed16,
}

impl SampleEncoding {
    /// Width of a single stored sample in bytes.
    pub fn width(self) -> usize {
        match self {
            SampleEncoding::Unsigned8 => 1,
            SampleEncoding::Signed16 => 2,
        }
    }

    /// Bit depth of a stored sample.
    pub fn bits(self) -> u16 {
        (self.width() * 8) as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleEncoding::Unsigned8 => "u8",
            SampleEncoding::Signed16 => "i16",
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully decoded clip. Never partially valid: it only exists once a decode has
/// succeeded, and it is immutable afterwards.
pub struct AudioBuffer {
    /// Raw stored samples, interleaved if multi-channel.
    data: Box<[u8]>,
    /// Sample rate in Hz.
    sample_rate: u32,
    /// Channel count, 1 or 2.
    channels: u16,
    /// The stored representation.
    encoding: SampleEncoding,
}

impl AudioBuffer {
    /// Wraps already converted sample bytes. The length is truncated to whole frames
    /// so that it is always a multiple of `channels * encoding.width()`.
    pub fn new(mut data: Vec<u8>, sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Self {
        let frame_bytes = usize::from(channels.max(1)) * encoding.width();
        data.truncate(data.len() - data.len() % frame_bytes);
        Self {
            data: data.into_boxed_slice(),
            sample_rate,
            channels: channels.max(1),
            encoding,
        }
    }

    /// Raw stored bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    /// Total number of stored samples across all channels.
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.encoding.width()
    }

    /// Number of frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        self.sample_count() / usize::from(self.channels)
    }

    /// Playback duration at the buffer's own sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Reads the stored sample at the given sample index as a signed 16-bit value,
    /// regardless of the stored encoding.
    pub fn sample_i16(&self, index: usize) -> Option<i16> {
        match self.encoding {
            SampleEncoding::Unsigned8 => self
                .data
                .get(index)
                .map(|&b| (i16::from(b) - i16::from(U8_CENTER)) << 8),
            SampleEncoding::Signed16 => {
                let offset = index * 2;
                let bytes = self.data.get(offset..offset + 2)?;
                Some(i16::from_le_bytes([bytes[0], bytes[1]]))
            }
        }
    }

    /// Iterates the first channel only, stepping over the remaining channels of each
    /// frame. This is exactly what the interrupt pusher plays.
    pub fn first_channel(&self) -> FirstChannel<'_> {
        FirstChannel {
            buffer: self,
            index: 0,
        }
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("bytes", &self.data.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Iterator over the first channel of a buffer.
pub struct FirstChannel<'a> {
    buffer: &'a AudioBuffer,
    /// Sample index (not byte offset).
    index: usize,
}

impl Iterator for FirstChannel<'_> {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        let sample = self.buffer.sample_i16(self.index)?;
        self.index += usize::from(self.buffer.channels);
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .buffer
            .sample_count()
            .saturating_sub(self.index)
            .div_ceil(usize::from(self.buffer.channels));
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FirstChannel<'_> {}
