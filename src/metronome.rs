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

//! The control loop side of the metronome. Everything here runs on one thread and
//! is driven by calling [`Metronome::tick`] once per loop iteration.

use tracing::{debug, info};

use crate::clock::{BeatClock, BeatEvent, Clock};
use crate::engine::AudioEngine;
use crate::program::{next_beats_per_bar, Program, ProgramError, BEATS_PER_BAR_CHOICES};
use crate::sequencer::{RhythmSequencer, SequenceError, SequencerEvent};

pub struct Metronome<C> {
    engine: AudioEngine,
    beat_clock: BeatClock,
    sequencer: RhythmSequencer,
    clock: C,
    loop_programs: bool,
}

impl<C: Clock> Metronome<C> {
    pub fn new(engine: AudioEngine, clock: C) -> Metronome<C> {
        Metronome {
            engine,
            beat_clock: BeatClock::default(),
            sequencer: RhythmSequencer::new(),
            clock,
            loop_programs: true,
        }
    }

    /// Sets whether programs started with [`Metronome::start_sequence`] loop.
    pub fn with_loop_programs(mut self, loop_programs: bool) -> Metronome<C> {
        self.loop_programs = loop_programs;
        self
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn beat_clock(&self) -> &BeatClock {
        &self.beat_clock
    }

    /// One control loop iteration: fires the beat that is due, if any, and moves the
    /// program along when a bar completes.
    pub fn tick(&mut self) -> Option<BeatEvent> {
        let beat = self.beat_clock.poll(self.clock.now_ms())?;
        self.engine.play(beat.role);

        if beat.bar_completed {
            match self.sequencer.on_bar_complete(&mut self.beat_clock) {
                SequencerEvent::StepAdvanced(step) => debug!(step, "Step advanced"),
                SequencerEvent::Looped => debug!("Program looped"),
                SequencerEvent::Halted => info!("Program halted"),
                SequencerEvent::BarCompleted => {}
            }
        }
        Some(beat)
    }

    /// Starts free running at the current tempo and signature. Stops any program.
    pub fn start(&mut self) {
        self.sequencer.stop(&mut self.beat_clock);
        info!(
            tempo_bpm = self.beat_clock.tempo_bpm(),
            beats_per_bar = self.beat_clock.beats_per_bar(),
            "Metronome started"
        );
        self.beat_clock.start();
    }

    /// Stops free running or program playback.
    pub fn stop(&mut self) {
        self.sequencer.stop(&mut self.beat_clock);
        info!("Metronome stopped");
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Plays a program from its first step using the configured loop setting.
    pub fn start_sequence(&mut self, program: &Program) -> Result<(), SequenceError> {
        self.start_sequence_with(program, self.loop_programs)
    }

    pub fn start_sequence_with(
        &mut self,
        program: &Program,
        loop_enabled: bool,
    ) -> Result<(), SequenceError> {
        self.sequencer
            .start(program, loop_enabled, &mut self.beat_clock)
    }

    pub fn stop_sequence(&mut self) {
        self.sequencer.stop(&mut self.beat_clock);
    }

    /// True while beats are firing, free running or from a program.
    pub fn is_playing(&self) -> bool {
        self.beat_clock.is_running()
    }

    pub fn is_sequence_running(&self) -> bool {
        self.sequencer.is_running()
    }

    pub fn current_step_index(&self) -> usize {
        self.sequencer.current_step_index()
    }

    pub fn tempo(&self) -> u16 {
        self.beat_clock.tempo_bpm()
    }

    /// Sets the tempo, clamped to the supported range.
    pub fn set_tempo(&mut self, tempo_bpm: u16) {
        self.beat_clock.set_tempo(tempo_bpm);
    }

    /// Moves the tempo up or down by `delta` BPM.
    pub fn nudge_tempo(&mut self, delta: i16) {
        let tempo = self.beat_clock.tempo_bpm().saturating_add_signed(delta);
        self.beat_clock.set_tempo(tempo);
    }

    pub fn beats_per_bar(&self) -> u8 {
        self.beat_clock.beats_per_bar()
    }

    pub fn set_beats_per_bar(&mut self, beats_per_bar: u8) -> Result<(), ProgramError> {
        if !BEATS_PER_BAR_CHOICES.contains(&beats_per_bar) {
            return Err(ProgramError::InvalidBeatsPerBar(beats_per_bar));
        }
        self.beat_clock.set_beats_per_bar(beats_per_bar);
        Ok(())
    }

    /// Steps to the next time signature and restarts the bar.
    pub fn cycle_time_signature(&mut self) -> u8 {
        let next = next_beats_per_bar(self.beat_clock.beats_per_bar());
        self.beat_clock.set_beats_per_bar(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::chunked::ChunkedPusher;
    use crate::audio::decoder::DecodeLimits;
    use crate::audio::mock::MockBulkOutput;
    use crate::audio::store::HeapBudget;
    use crate::audio::Role;
    use crate::clock::{MAX_TEMPO_BPM, MIN_TEMPO_BPM};
    use crate::program::SequenceStep;
    use crate::testutil::{write_sound_set, ManualClock};

    struct Fixture {
        metronome: Metronome<ManualClock>,
        clock: ManualClock,
        output: MockBulkOutput,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        write_sound_set(dir.path(), "Metro", 2).unwrap();
        let output = MockBulkOutput::recording();
        let mut engine = AudioEngine::new(
            Box::new(ChunkedPusher::new(output.clone())),
            dir.path(),
            DecodeLimits::default(),
            Arc::new(HeapBudget::new(1_000_000)),
        );
        assert!(engine.select_sound_set("Metro"));
        let clock = ManualClock::new();
        Fixture {
            metronome: Metronome::new(engine, clock.clone()),
            clock,
            output,
            _dir: dir,
        }
    }

    /// Runs the control loop in 1ms steps and returns the time of every beat.
    fn run_for(fixture: &mut Fixture, ms: u64) -> Vec<(u64, BeatEvent)> {
        let mut beats = Vec::new();
        for _ in 0..ms {
            if let Some(beat) = fixture.metronome.tick() {
                beats.push((fixture.clock.now_ms(), beat));
            }
            fixture.clock.advance(1);
        }
        beats
    }

    #[test]
    fn test_free_running_at_120() {
        let mut fixture = fixture();
        fixture.clock.set(1_000);
        fixture.metronome.start();
        assert!(fixture.metronome.is_playing());

        let beats = run_for(&mut fixture, 2_001);
        let times: Vec<u64> = beats.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![1_000, 1_500, 2_000, 2_500, 3_000]);

        let indexes: Vec<u8> = beats.iter().map(|(_, b)| b.beat_index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 0]);
        assert_eq!(beats[0].1.role, Role::Downbeat);
        assert_eq!(beats[4].1.role, Role::Downbeat);

        // Every beat played the matching clip.
        let transfers = fixture.output.transfers();
        assert_eq!(transfers.len(), 5);
        assert_eq!(transfers[0], vec![12000; 2]);
        assert_eq!(transfers[1], vec![-12000; 2]);
    }

    #[test]
    fn test_toggle() {
        let mut fixture = fixture();
        fixture.metronome.toggle();
        assert!(fixture.metronome.is_playing());
        fixture.metronome.toggle();
        assert!(!fixture.metronome.is_playing());
        assert!(run_for(&mut fixture, 1_000).is_empty());
    }

    #[test]
    fn test_program_halts() {
        let mut fixture = fixture();
        let program = Program::new(vec![
            SequenceStep::new(2, 4, 100).unwrap(),
            SequenceStep::new(1, 3, 140).unwrap(),
        ]);
        fixture
            .metronome
            .start_sequence_with(&program, false)
            .unwrap();
        assert!(fixture.metronome.is_sequence_running());

        // 8 beats at 600ms, then 3 beats at 428ms.
        let beats = run_for(&mut fixture, 10_000);
        assert_eq!(beats.len(), 11);
        assert_eq!(beats[7].0, 4_200);
        assert_eq!(beats[8].0, 4_628);
        assert_eq!(beats[8].1.role, Role::Downbeat);
        assert_eq!(beats[10].0, 5_484);

        assert!(!fixture.metronome.is_playing());
        assert!(!fixture.metronome.is_sequence_running());
        assert_eq!(fixture.metronome.current_step_index(), 1);
    }

    #[test]
    fn test_program_loops() {
        let mut fixture = fixture();
        let program = Program::new(vec![
            SequenceStep::new(2, 4, 100).unwrap(),
            SequenceStep::new(1, 3, 140).unwrap(),
        ]);
        fixture.metronome.start_sequence(&program).unwrap();

        let beats = run_for(&mut fixture, 6_100);
        assert_eq!(beats.len(), 12);
        assert_eq!(beats[11].0, 5_484 + 600);
        assert_eq!(beats[11].1.role, Role::Downbeat);
        assert_eq!(fixture.metronome.current_step_index(), 0);
        assert_eq!(fixture.metronome.tempo(), 100);
        assert!(fixture.metronome.is_playing());

        fixture.metronome.stop_sequence();
        assert!(!fixture.metronome.is_playing());
    }

    #[test]
    fn test_empty_program() {
        let mut fixture = fixture();
        assert_eq!(
            fixture.metronome.start_sequence(&Program::default()),
            Err(SequenceError::EmptyProgram)
        );
        assert!(!fixture.metronome.is_playing());
    }

    #[test]
    fn test_tempo_controls() {
        let mut fixture = fixture();
        fixture.metronome.set_tempo(500);
        assert_eq!(fixture.metronome.tempo(), MAX_TEMPO_BPM);
        fixture.metronome.nudge_tempo(-20);
        assert_eq!(fixture.metronome.tempo(), MAX_TEMPO_BPM - 20);
        fixture.metronome.set_tempo(MIN_TEMPO_BPM);
        fixture.metronome.nudge_tempo(-100);
        assert_eq!(fixture.metronome.tempo(), MIN_TEMPO_BPM);
    }

    #[test]
    fn test_time_signature_controls() {
        let mut fixture = fixture();
        assert_eq!(fixture.metronome.beats_per_bar(), 4);
        assert!(matches!(
            fixture.metronome.set_beats_per_bar(8),
            Err(ProgramError::InvalidBeatsPerBar(8))
        ));

        fixture.metronome.set_beats_per_bar(7).unwrap();
        assert_eq!(fixture.metronome.cycle_time_signature(), 9);
        assert_eq!(fixture.metronome.cycle_time_signature(), 2);

        fixture.metronome.start();
        let beats = run_for(&mut fixture, 1_001);
        let roles: Vec<Role> = beats.iter().map(|(_, b)| b.role).collect();
        assert_eq!(roles, vec![Role::Downbeat, Role::Beat, Role::Downbeat]);
    }
}
