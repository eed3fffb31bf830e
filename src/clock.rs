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
use std::time::Instant;

use tracing::debug;

use crate::audio::Role;

/// Slowest tempo the metronome will run at.
pub const MIN_TEMPO_BPM: u16 = 40;

/// Fastest tempo the metronome will run at.
pub const MAX_TEMPO_BPM: u16 = 250;

/// A monotonic millisecond counter.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the clock was created.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A beat that is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// Which clip to play.
    pub role: Role,
    /// Position of this beat within the bar, starting at 0.
    pub beat_index: u8,
    /// True if this was the last beat of the bar.
    pub bar_completed: bool,
}

/// Decides when the next beat is due. Polled from the control loop, so the timing
/// resolution is the loop period.
#[derive(Debug, Clone)]
pub struct BeatClock {
    tempo_bpm: u16,
    beats_per_bar: u8,
    current_beat: u8,
    last_fire_ms: Option<u64>,
    running: bool,
}

impl Default for BeatClock {
    fn default() -> Self {
        BeatClock::new(120, 4)
    }
}

impl BeatClock {
    pub fn new(tempo_bpm: u16, beats_per_bar: u8) -> BeatClock {
        BeatClock {
            tempo_bpm: clamp_tempo(tempo_bpm),
            beats_per_bar: beats_per_bar.max(1),
            current_beat: 0,
            last_fire_ms: None,
            running: false,
        }
    }

    pub fn tempo_bpm(&self) -> u16 {
        self.tempo_bpm
    }

    pub fn beats_per_bar(&self) -> u8 {
        self.beats_per_bar
    }

    /// The beat that fires next, starting at 0.
    pub fn current_beat(&self) -> u8 {
        self.current_beat
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Milliseconds between beats at the current tempo.
    pub fn interval_ms(&self) -> u64 {
        60_000 / u64::from(self.tempo_bpm)
    }

    /// Starts from the downbeat. The first beat fires on the next poll.
    pub fn start(&mut self) {
        self.current_beat = 0;
        self.last_fire_ms = None;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Changes the tempo without disturbing the position in the bar. Clamped to
    /// the supported range.
    pub fn set_tempo(&mut self, tempo_bpm: u16) {
        self.tempo_bpm = clamp_tempo(tempo_bpm);
    }

    /// Changes the bar length and restarts the bar.
    pub fn set_beats_per_bar(&mut self, beats_per_bar: u8) {
        self.beats_per_bar = beats_per_bar.max(1);
        self.current_beat = 0;
    }

    /// Switches to a new tempo and bar length at a bar boundary.
    pub fn configure(&mut self, beats_per_bar: u8, tempo_bpm: u16) {
        self.set_tempo(tempo_bpm);
        self.set_beats_per_bar(beats_per_bar);
        debug!(
            beats_per_bar = self.beats_per_bar,
            tempo_bpm = self.tempo_bpm,
            "Beat clock configured"
        );
    }

    /// Returns the beat that is due at `now_ms`, if any. At most one beat fires per
    /// poll. A late poll delays the beat rather than firing a catch-up burst.
    pub fn poll(&mut self, now_ms: u64) -> Option<BeatEvent> {
        if !self.running {
            return None;
        }
        if let Some(last) = self.last_fire_ms {
            if now_ms.saturating_sub(last) < self.interval_ms() {
                return None;
            }
        }

        self.last_fire_ms = Some(now_ms);
        let beat_index = self.current_beat;
        let role = if beat_index == 0 {
            Role::Downbeat
        } else {
            Role::Beat
        };
        self.current_beat += 1;
        let bar_completed = self.current_beat >= self.beats_per_bar;
        if bar_completed {
            self.current_beat = 0;
        }

        Some(BeatEvent {
            role,
            beat_index,
            bar_completed,
        })
    }
}

/// Clamps a tempo to the supported range.
pub fn clamp_tempo(tempo_bpm: u16) -> u16 {
    tempo_bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM)
}
