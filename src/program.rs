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
    fmt, fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::clock::{MAX_TEMPO_BPM, MIN_TEMPO_BPM};

/// Bar lengths the metronome offers, in the order the time signature button cycles.
pub const BEATS_PER_BAR_CHOICES: [u8; 7] = [2, 3, 4, 5, 6, 7, 9];

/// Extension of saved program files.
pub const PROGRAM_EXTENSION: &str = "txt";

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("A step needs at least one bar")]
    InvalidBars(u32),

    #[error("{0} beats per bar is not supported")]
    InvalidBeatsPerBar(u8),

    #[error("Tempo {0} is outside {min}..={max} BPM", min = MIN_TEMPO_BPM, max = MAX_TEMPO_BPM)]
    InvalidTempo(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns the bar length that follows `current` in the time signature cycle.
pub fn next_beats_per_bar(current: u8) -> u8 {
    BEATS_PER_BAR_CHOICES
        .iter()
        .position(|b| *b == current)
        .map(|i| BEATS_PER_BAR_CHOICES[(i + 1) % BEATS_PER_BAR_CHOICES.len()])
        .unwrap_or(BEATS_PER_BAR_CHOICES[0])
}

/// Returns the time signature label for a bar length. 6, 7 and 9 count in eighths.
pub fn time_signature_label(beats_per_bar: u8) -> String {
    match beats_per_bar {
        6 | 7 | 9 => format!("{}/8", beats_per_bar),
        _ => format!("{}/4", beats_per_bar),
    }
}

/// One segment of a program: a number of bars at a fixed signature and tempo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStep {
    bars: u32,
    beats_per_bar: u8,
    tempo_bpm: u16,
}

impl Default for SequenceStep {
    fn default() -> Self {
        SequenceStep {
            bars: 4,
            beats_per_bar: 4,
            tempo_bpm: 120,
        }
    }
}

impl SequenceStep {
    pub fn new(bars: u32, beats_per_bar: u8, tempo_bpm: u16) -> Result<SequenceStep, ProgramError> {
        if bars == 0 {
            return Err(ProgramError::InvalidBars(bars));
        }
        if !BEATS_PER_BAR_CHOICES.contains(&beats_per_bar) {
            return Err(ProgramError::InvalidBeatsPerBar(beats_per_bar));
        }
        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&tempo_bpm) {
            return Err(ProgramError::InvalidTempo(tempo_bpm));
        }
        Ok(SequenceStep {
            bars,
            beats_per_bar,
            tempo_bpm,
        })
    }

    pub fn bars(&self) -> u32 {
        self.bars
    }

    pub fn beats_per_bar(&self) -> u8 {
        self.beats_per_bar
    }

    pub fn tempo_bpm(&self) -> u16 {
        self.tempo_bpm
    }

    pub fn label(&self) -> String {
        time_signature_label(self.beats_per_bar)
    }

    /// Renders the step as a `bars,beatsPerBar,bpm` line without the newline.
    pub fn to_line(&self) -> String {
        format!("{},{},{}", self.bars, self.beats_per_bar, self.tempo_bpm)
    }

    /// Parses a `bars,beatsPerBar,bpm` line. Returns None for anything else,
    /// including values outside the supported ranges.
    pub fn parse_line(line: &str) -> Option<SequenceStep> {
        let mut fields = line.trim().split(',').map(str::trim);
        let bars = fields.next()?.parse().ok()?;
        let beats_per_bar = fields.next()?.parse().ok()?;
        let tempo_bpm = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
            return None;
        }
        SequenceStep::new(bars, beats_per_bar, tempo_bpm).ok()
    }
}

impl fmt::Display for SequenceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x {} @ {} BPM", self.bars, self.label(), self.tempo_bpm)
    }
}

/// An ordered list of steps, plus the sounds it was authored with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    steps: Vec<SequenceStep>,
    downbeat_sound: Option<PathBuf>,
    beat_sound: Option<PathBuf>,
}

impl Program {
    pub fn new(steps: Vec<SequenceStep>) -> Program {
        Program {
            steps,
            ..Default::default()
        }
    }

    /// Records the sound files the program was authored with.
    pub fn with_sounds(mut self, downbeat: Option<PathBuf>, beat: Option<PathBuf>) -> Program {
        self.downbeat_sound = downbeat;
        self.beat_sound = beat;
        self
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&SequenceStep> {
        self.steps.get(index)
    }

    pub fn push(&mut self, step: SequenceStep) {
        self.steps.push(step);
    }

    pub fn remove(&mut self, index: usize) -> Option<SequenceStep> {
        (index < self.steps.len()).then(|| self.steps.remove(index))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn downbeat_sound(&self) -> Option<&Path> {
        self.downbeat_sound.as_deref()
    }

    pub fn beat_sound(&self) -> Option<&Path> {
        self.beat_sound.as_deref()
    }

    /// Serializes the steps, one newline terminated line each.
    pub fn to_text(&self) -> String {
        self.steps
            .iter()
            .map(|step| step.to_line() + "\n")
            .collect()
    }

    /// Parses program text. Blank lines are ignored and malformed lines are skipped.
    pub fn parse(text: &str) -> Program {
        let steps = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(number, line)| {
                let step = SequenceStep::parse_line(line);
                if step.is_none() {
                    debug!(line = number + 1, content = line, "Skipping malformed program line");
                }
                step
            })
            .collect();
        Program::new(steps)
    }

    pub fn load(path: &Path) -> Result<Program, ProgramError> {
        let program = Program::parse(&fs::read_to_string(path)?);
        info!(path = ?path, steps = program.len(), "Loaded program");
        Ok(program)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProgramError> {
        fs::write(path, self.to_text())?;
        info!(path = ?path, steps = self.len(), "Saved program");
        Ok(())
    }
}

/// Lists the saved programs in `dir`, sorted by path.
pub fn list_programs(dir: &Path) -> Result<Vec<PathBuf>, ProgramError> {
    let mut programs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == PROGRAM_EXTENSION) {
            programs.push(path);
        }
    }
    programs.sort();
    Ok(programs)
}
