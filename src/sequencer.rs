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
use tracing::info;

use crate::clock::BeatClock;
use crate::program::{Program, SequenceStep};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("Program has no steps")]
    EmptyProgram,
}

/// Progress through a running program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerState {
    pub current_step: usize,
    pub bars_completed: u32,
    pub loop_enabled: bool,
}

/// What a completed bar did to the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEvent {
    /// The current step has bars left.
    BarCompleted,
    /// Moved on to the given step.
    StepAdvanced(usize),
    /// Finished the last step and went back to the first.
    Looped,
    /// Finished the last step and stopped the beat clock.
    Halted,
}

/// Walks a program step by step, reconfiguring the beat clock at step boundaries.
#[derive(Debug, Default)]
pub struct RhythmSequencer {
    steps: Vec<SequenceStep>,
    state: SequencerState,
    running: bool,
}

impl RhythmSequencer {
    pub fn new() -> RhythmSequencer {
        Self::default()
    }

    /// Starts `program` from its first step and starts the beat clock.
    pub fn start(
        &mut self,
        program: &Program,
        loop_enabled: bool,
        clock: &mut BeatClock,
    ) -> Result<(), SequenceError> {
        if program.is_empty() {
            return Err(SequenceError::EmptyProgram);
        }

        self.steps = program.steps().to_vec();
        self.state = SequencerState {
            current_step: 0,
            bars_completed: 0,
            loop_enabled,
        };
        self.running = true;
        info!(steps = self.steps.len(), loop_enabled, "Starting program");

        self.apply_current_step(clock);
        clock.start();
        Ok(())
    }

    /// Stops the program and the beat clock. The step index is kept.
    pub fn stop(&mut self, clock: &mut BeatClock) {
        if self.running {
            info!(step = self.state.current_step, "Stopping program");
        }
        self.running = false;
        clock.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_step_index(&self) -> usize {
        self.state.current_step
    }

    pub fn current_step(&self) -> Option<&SequenceStep> {
        self.steps.get(self.state.current_step)
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn set_loop_enabled(&mut self, loop_enabled: bool) {
        self.state.loop_enabled = loop_enabled;
    }

    /// Called by the control loop whenever the beat clock completes a bar.
    pub fn on_bar_complete(&mut self, clock: &mut BeatClock) -> SequencerEvent {
        if !self.running {
            return SequencerEvent::BarCompleted;
        }
        let bars = self
            .current_step()
            .map(SequenceStep::bars)
            .unwrap_or_default();

        self.state.bars_completed += 1;
        if self.state.bars_completed < bars {
            return SequencerEvent::BarCompleted;
        }
        self.state.bars_completed = 0;

        let next = self.state.current_step + 1;
        if next < self.steps.len() {
            self.state.current_step = next;
            self.apply_current_step(clock);
            info!(step = next, "Next step");
            SequencerEvent::StepAdvanced(next)
        } else if self.state.loop_enabled {
            self.state.current_step = 0;
            self.apply_current_step(clock);
            info!("Program looped");
            SequencerEvent::Looped
        } else {
            self.running = false;
            clock.stop();
            info!("Program finished");
            SequencerEvent::Halted
        }
    }

    fn apply_current_step(&self, clock: &mut BeatClock) {
        if let Some(step) = self.current_step() {
            clock.configure(step.beats_per_bar(), step.tempo_bpm());
        }
    }
}
