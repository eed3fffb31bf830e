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

//! Audio engine and rhythm sequencer for a touchscreen metronome.
//!
//! Sound clips are decoded from WAV files into one of two stored representations
//! and pushed to the output either one sample per timer interrupt or in chunked
//! bulk transfers. A polled beat clock decides when each clip plays, and a rhythm
//! sequencer walks through programs of tempo and time signature changes.

pub mod audio;
pub mod clock;
pub mod config;
pub mod engine;
pub mod metronome;
pub mod program;
pub mod sequencer;
pub mod util;

#[cfg(test)]
mod testutil;
