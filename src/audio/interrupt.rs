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

//! Interrupt clocked playback for a directly driven, unbuffered DAC.
//!
//! A periodic timer interrupt fires once per sample and writes a single byte to the
//! DAC. Everything the interrupt reads lives in one record behind a critical section,
//! and [`InterruptPusher::transaction`] is the only way to touch it from the control
//! loop.

use std::cell::RefCell;
use std::sync::Arc;

use critical_section::Mutex;

use super::buffer::{AudioBuffer, SampleEncoding, U8_CENTER};
use super::error::PlaybackError;
use super::PlaybackDriver;

/// A hardware timer that raises the sample interrupt.
pub trait SampleTimer: Send {
    /// Programs the interval between interrupts.
    fn set_period_us(&mut self, period_us: u32);

    fn enable(&mut self);

    fn disable(&mut self);
}

/// A DAC that takes one unsigned 8-bit sample at a time.
pub trait DacOutput: Send {
    /// Writes a sample. Must not block.
    fn write(&mut self, value: u8);
}

/// Where the cursor is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    /// Play was requested, the first tick has not happened yet.
    Armed,
    Playing,
}

/// The position of the interrupt within the active buffer.
pub struct PlaybackCursor {
    buffer: Option<Arc<AudioBuffer>>,
    /// Byte offset of the next sample.
    offset: usize,
    state: CursorState,
}

impl PlaybackCursor {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != CursorState::Idle
    }

    /// The buffer the cursor points at. It is kept after playback ends and only
    /// released by the next play request, so the interrupt never frees memory.
    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }
}

/// Everything shared between the control loop and the interrupt.
pub struct InterruptShared<T, D> {
    cursor: PlaybackCursor,
    volume: u8,
    timer: T,
    dac: D,
}

impl<T: SampleTimer, D: DacOutput> InterruptShared<T, D> {
    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// One sample interrupt. Never allocates, never blocks.
    fn tick(&mut self) {
        if self.cursor.state == CursorState::Idle {
            self.timer.disable();
            return;
        }
        let Some(buffer) = self.cursor.buffer.as_deref() else {
            self.cursor.state = CursorState::Idle;
            self.timer.disable();
            return;
        };

        if self.cursor.offset >= buffer.len() {
            self.cursor.state = CursorState::Idle;
            self.dac.write(U8_CENTER);
            self.timer.disable();
            return;
        }

        let sample = buffer.bytes()[self.cursor.offset];
        // Only the first channel is played.
        self.cursor.offset += usize::from(buffer.channels());
        self.cursor.state = CursorState::Playing;
        self.dac.write(scale_unsigned8(sample, self.volume));
    }
}

/// Scales an unsigned 8-bit sample around its center. Full volume passes the
/// sample through untouched.
pub fn scale_unsigned8(sample: u8, volume: u8) -> u8 {
    if volume == u8::MAX {
        return sample;
    }
    let centered = i32::from(sample) - i32::from(U8_CENTER);
    (((centered * i32::from(volume)) >> 8) + i32::from(U8_CENTER)) as u8
}

type SharedCell<T, D> = Arc<Mutex<RefCell<InterruptShared<T, D>>>>;

/// Strategy A: pushes one sample per timer interrupt.
pub struct InterruptPusher<T, D> {
    shared: SharedCell<T, D>,
}

impl<T: SampleTimer, D: DacOutput> InterruptPusher<T, D> {
    /// Creates the pusher, parking the DAC at its center value to avoid a pop.
    pub fn new(mut timer: T, mut dac: D) -> Self {
        timer.disable();
        dac.write(U8_CENTER);
        InterruptPusher {
            shared: Arc::new(Mutex::new(RefCell::new(InterruptShared {
                cursor: PlaybackCursor {
                    buffer: None,
                    offset: 0,
                    state: CursorState::Idle,
                },
                volume: u8::MAX,
                timer,
                dac,
            }))),
        }
    }

    /// Runs `f` on the shared record with the sample interrupt held off.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut InterruptShared<T, D>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.shared.borrow_ref_mut(cs)))
    }

    /// The entry point for the platform's interrupt handler.
    pub fn handle(&self) -> InterruptHandle<T, D> {
        InterruptHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn cursor_state(&self) -> CursorState {
        self.transaction(|shared| shared.cursor.state)
    }

    pub fn cursor_offset(&self) -> usize {
        self.transaction(|shared| shared.cursor.offset)
    }
}

impl<T: SampleTimer, D: DacOutput> PlaybackDriver for InterruptPusher<T, D> {
    fn encoding(&self) -> SampleEncoding {
        SampleEncoding::Unsigned8
    }

    fn play(&mut self, buffer: &Arc<AudioBuffer>) -> Result<(), PlaybackError> {
        if buffer.encoding() != SampleEncoding::Unsigned8 {
            return Err(PlaybackError::EncodingMismatch {
                buffer: buffer.encoding(),
                driver: SampleEncoding::Unsigned8,
            });
        }

        let period_us = 1_000_000 / buffer.sample_rate().max(1);
        let previous = self.transaction(|shared| {
            let previous = shared.cursor.buffer.replace(Arc::clone(buffer));
            shared.cursor.offset = 0;
            shared.cursor.state = CursorState::Armed;
            shared.timer.set_period_us(period_us);
            shared.timer.enable();
            previous
        });
        // The previous buffer may be the last reference to a replaced clip. Drop it
        // here, outside of the critical section.
        drop(previous);
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) {
        self.transaction(|shared| shared.volume = volume);
    }

    fn volume(&self) -> u8 {
        self.transaction(|shared| shared.volume)
    }

    fn is_playing(&self) -> bool {
        self.transaction(|shared| shared.cursor.is_active())
    }
}

/// A cloneable reference to the shared record for the interrupt handler.
pub struct InterruptHandle<T, D> {
    shared: SharedCell<T, D>,
}

impl<T, D> Clone for InterruptHandle<T, D> {
    fn clone(&self) -> Self {
        InterruptHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: SampleTimer, D: DacOutput> InterruptHandle<T, D> {
    /// Call once per timer interrupt.
    pub fn on_tick(&self) {
        critical_section::with(|cs| self.shared.borrow_ref_mut(cs).tick());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{MockDac, MockTimer};

    fn pusher() -> (InterruptPusher<MockTimer, MockDac>, MockTimer, MockDac) {
        let timer = MockTimer::default();
        let dac = MockDac::default();
        let pusher = InterruptPusher::new(timer.clone(), dac.clone());
        dac.clear();
        (pusher, timer, dac)
    }

    fn clip(bytes: Vec<u8>, channels: u16) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(bytes, 22050, channels, SampleEncoding::Unsigned8))
    }

    #[test]
    fn test_play_arms_timer() {
        let (mut pusher, timer, _) = pusher();
        assert!(!timer.is_enabled());

        pusher.play(&clip(vec![100, 150], 1)).unwrap();

        assert!(timer.is_enabled());
        assert_eq!(timer.period_us(), Some(1_000_000 / 22050));
        assert_eq!(pusher.cursor_state(), CursorState::Armed);
        assert!(pusher.is_playing());
    }

    #[test]
    fn test_plays_to_completion() {
        let (mut pusher, timer, dac) = pusher();
        let handle = pusher.handle();
        pusher.play(&clip(vec![100, 150, 200], 1)).unwrap();

        handle.on_tick();
        assert_eq!(pusher.cursor_state(), CursorState::Playing);
        handle.on_tick();
        handle.on_tick();
        assert!(timer.is_enabled());

        // The tick after the last sample centers the DAC and stops the timer.
        handle.on_tick();
        assert_eq!(dac.writes(), vec![100, 150, 200, U8_CENTER]);
        assert!(!timer.is_enabled());
        assert_eq!(pusher.cursor_state(), CursorState::Idle);
        assert!(!pusher.is_playing());

        // Stray ticks after that only keep the timer off.
        handle.on_tick();
        assert_eq!(dac.writes().len(), 4);
        assert!(!timer.is_enabled());
    }

    #[test]
    fn test_skips_extra_channels() {
        let (mut pusher, _, dac) = pusher();
        let handle = pusher.handle();
        pusher.play(&clip(vec![10, 200, 20, 210, 30, 220], 2)).unwrap();

        for _ in 0..4 {
            handle.on_tick();
        }
        assert_eq!(dac.writes(), vec![10, 20, 30, U8_CENTER]);
    }

    #[test]
    fn test_volume_scaling() {
        assert_eq!(scale_unsigned8(255, 128), 191);
        assert_eq!(scale_unsigned8(0, 128), 64);
        assert_eq!(scale_unsigned8(128, 17), 128);
        assert_eq!(scale_unsigned8(255, 0), 128);
        assert_eq!(scale_unsigned8(37, 255), 37);

        let (mut pusher, _, dac) = pusher();
        let handle = pusher.handle();
        pusher.set_volume(128);
        assert_eq!(pusher.volume(), 128);
        pusher.play(&clip(vec![255], 1)).unwrap();
        handle.on_tick();
        assert_eq!(dac.writes(), vec![191]);
    }

    #[test]
    fn test_replay_restarts_from_beginning() {
        let (mut pusher, _, dac) = pusher();
        let handle = pusher.handle();
        let first = clip(vec![1, 2, 3, 4], 1);
        let second = clip(vec![9, 8], 1);

        pusher.play(&first).unwrap();
        handle.on_tick();
        handle.on_tick();
        assert_eq!(pusher.cursor_offset(), 2);

        pusher.play(&second).unwrap();
        assert_eq!(pusher.cursor_offset(), 0);
        handle.on_tick();
        handle.on_tick();
        handle.on_tick();
        assert_eq!(dac.writes(), vec![1, 2, 9, 8, U8_CENTER]);
    }

    #[test]
    fn test_cursor_keeps_replaced_buffer_alive() {
        let (mut pusher, _, dac) = pusher();
        let handle = pusher.handle();
        let mut slot = Some(clip(vec![40, 50, 60], 1));

        pusher.play(slot.as_ref().unwrap()).unwrap();
        handle.on_tick();

        // Reloading the role drops the store's reference mid-playback.
        slot = Some(clip(vec![1], 1));
        handle.on_tick();
        handle.on_tick();
        handle.on_tick();
        assert_eq!(dac.writes(), vec![40, 50, 60, U8_CENTER]);

        // The stale clip is released by the next play, not by the interrupt.
        let stale = pusher
            .transaction(|shared| shared.cursor().buffer().map(Arc::downgrade))
            .unwrap();
        assert!(stale.upgrade().is_some());
        pusher.play(slot.as_ref().unwrap()).unwrap();
        assert!(stale.upgrade().is_none());
    }

    #[test]
    fn test_empty_buffer_stops_immediately() {
        let (mut pusher, timer, dac) = pusher();
        let handle = pusher.handle();
        pusher.play(&clip(Vec::new(), 1)).unwrap();
        handle.on_tick();
        assert_eq!(dac.writes(), vec![U8_CENTER]);
        assert!(!timer.is_enabled());
    }

    #[test]
    fn test_rejects_signed_buffers() {
        let (mut pusher, timer, _) = pusher();
        let buffer = Arc::new(AudioBuffer::new(vec![0; 4], 44100, 1, SampleEncoding::Signed16));
        assert!(matches!(
            pusher.play(&buffer),
            Err(PlaybackError::EncodingMismatch { .. })
        ));
        assert!(!timer.is_enabled());
    }
}
