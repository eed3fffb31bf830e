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
use std::sync::Arc;

use tracing::{debug, span, Level};

use super::buffer::{AudioBuffer, SampleEncoding};
use super::error::{OutputError, PlaybackError};
use super::PlaybackDriver;

/// Bytes of stored audio handed to the peripheral per transfer.
pub const TRANSFER_CHUNK_BYTES: usize = 1024;

/// A buffered digital audio interface that takes whole chunks of samples.
pub trait BulkOutput: Send {
    /// Queues a chunk of interleaved samples, blocking until the peripheral has room.
    fn write_blocking(
        &mut self,
        samples: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> Result<(), OutputError>;
}

/// Scales a signed sample by `volume / 255`, saturating at the i16 range.
pub fn scale_signed16(sample: i16, volume: u8) -> i16 {
    let scaled = i32::from(sample) * i32::from(volume) / 255;
    scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Strategy B: copies the buffer to a bulk output in fixed size chunks, applying gain
/// in software. Playing is synchronous: `play` returns once the last chunk is queued.
pub struct ChunkedPusher<O> {
    output: O,
    volume: u8,
    /// Reused for every chunk so playback never allocates.
    scratch: Vec<i16>,
}

impl<O: BulkOutput> ChunkedPusher<O> {
    pub fn new(output: O) -> ChunkedPusher<O> {
        ChunkedPusher {
            output,
            volume: u8::MAX,
            scratch: Vec::with_capacity(TRANSFER_CHUNK_BYTES / SampleEncoding::Signed16.width()),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}

impl<O: BulkOutput> PlaybackDriver for ChunkedPusher<O> {
    fn encoding(&self) -> SampleEncoding {
        SampleEncoding::Signed16
    }

    fn play(&mut self, buffer: &Arc<AudioBuffer>) -> Result<(), PlaybackError> {
        if buffer.encoding() != SampleEncoding::Signed16 {
            return Err(PlaybackError::EncodingMismatch {
                buffer: buffer.encoding(),
                driver: SampleEncoding::Signed16,
            });
        }

        let span = span!(Level::DEBUG, "chunked playback");
        let _enter = span.enter();
        debug!(
            bytes = buffer.len(),
            sample_rate = buffer.sample_rate(),
            volume = self.volume,
            "Pushing clip"
        );

        let volume = self.volume;
        for chunk in buffer.bytes().chunks(TRANSFER_CHUNK_BYTES) {
            self.scratch.clear();
            self.scratch.extend(
                chunk
                    .chunks_exact(2)
                    .map(|pair| scale_signed16(i16::from_le_bytes([pair[0], pair[1]]), volume)),
            );
            self.output
                .write_blocking(&self.scratch, buffer.channels(), buffer.sample_rate())?;
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn is_playing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockBulkOutput;

    fn clip(samples: &[i16]) -> Arc<AudioBuffer> {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Arc::new(AudioBuffer::new(bytes, 44100, 1, SampleEncoding::Signed16))
    }

    #[test]
    fn test_splits_into_chunks() {
        let output = MockBulkOutput::recording();
        let mut pusher = ChunkedPusher::new(output.clone());
        let samples: Vec<i16> = (0..1500).map(|i| i as i16).collect();

        pusher.play(&clip(&samples)).unwrap();

        let transfers = output.transfers();
        assert_eq!(
            transfers.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![512, 512, 476]
        );
        assert_eq!(transfers.concat(), samples);
    }

    #[test]
    fn test_volume() {
        assert_eq!(scale_signed16(1000, 255), 1000);
        assert_eq!(scale_signed16(1000, 128), 501);
        assert_eq!(scale_signed16(i16::MIN, 128), -16448);
        assert_eq!(scale_signed16(i16::MAX, 0), 0);

        let output = MockBulkOutput::recording();
        let mut pusher = ChunkedPusher::new(output.clone());
        pusher.set_volume(128);
        assert_eq!(pusher.volume(), 128);
        pusher.play(&clip(&[1000, -1000])).unwrap();
        assert_eq!(output.transfers(), vec![vec![501, -501]]);
    }

    #[test]
    fn test_reports_output_errors() {
        let output = MockBulkOutput::recording();
        let mut pusher = ChunkedPusher::new(output.clone());
        output.disconnect();
        assert!(matches!(
            pusher.play(&clip(&[1, 2, 3])),
            Err(PlaybackError::Output(OutputError::Disconnected))
        ));
    }

    #[test]
    fn test_rejects_unsigned_buffers() {
        let mut pusher = ChunkedPusher::new(MockBulkOutput::recording());
        let buffer = Arc::new(AudioBuffer::new(vec![128; 4], 22050, 1, SampleEncoding::Unsigned8));
        assert!(matches!(
            pusher.play(&buffer),
            Err(PlaybackError::EncodingMismatch { .. })
        ));
        assert!(!pusher.is_playing());
    }

    #[test]
    fn test_empty_clip_sends_nothing() {
        let output = MockBulkOutput::recording();
        let mut pusher = ChunkedPusher::new(output.clone());
        pusher.play(&clip(&[])).unwrap();
        assert_eq!(output.transfer_count(), 0);
    }
}
