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
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::trace;

use super::chunked::BulkOutput;
use super::error::OutputError;
use super::interrupt::{DacOutput, SampleTimer};

/// A mock DAC. Records every byte written to it.
#[derive(Clone, Default)]
pub struct MockDac {
    writes: Arc<Mutex<Vec<u8>>>,
}

impl MockDac {
    pub fn writes(&self) -> Vec<u8> {
        self.writes.lock().clone()
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
    }
}

impl DacOutput for MockDac {
    fn write(&mut self, value: u8) {
        self.writes.lock().push(value);
    }
}

#[derive(Default)]
struct TimerState {
    period_us: Option<u32>,
    enabled: bool,
    enable_count: usize,
}

/// A mock sample timer. Never fires on its own; tests tick the interrupt handle by hand.
#[derive(Clone, Default)]
pub struct MockTimer {
    state: Arc<Mutex<TimerState>>,
}

impl MockTimer {
    pub fn period_us(&self) -> Option<u32> {
        self.state.lock().period_us
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn enable_count(&self) -> usize {
        self.state.lock().enable_count
    }
}

impl SampleTimer for MockTimer {
    fn set_period_us(&mut self, period_us: u32) {
        self.state.lock().period_us = Some(period_us);
    }

    fn enable(&mut self) {
        let mut state = self.state.lock();
        state.enabled = true;
        state.enable_count += 1;
    }

    fn disable(&mut self) {
        self.state.lock().enabled = false;
    }
}

/// A mock bulk transfer peripheral. Either records every chunk or only counts them.
#[derive(Clone)]
pub struct MockBulkOutput {
    record: bool,
    transfers: Arc<Mutex<Vec<Vec<i16>>>>,
    transfer_count: Arc<AtomicUsize>,
    disconnected: Arc<AtomicBool>,
}

impl Default for MockBulkOutput {
    fn default() -> Self {
        Self::recording()
    }
}

impl MockBulkOutput {
    /// Keeps a copy of every transfer.
    pub fn recording() -> MockBulkOutput {
        MockBulkOutput {
            record: true,
            transfers: Arc::new(Mutex::new(Vec::new())),
            transfer_count: Arc::new(AtomicUsize::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Only counts transfers, for long running sessions.
    pub fn counting() -> MockBulkOutput {
        MockBulkOutput {
            record: false,
            ..Self::recording()
        }
    }

    pub fn transfers(&self) -> Vec<Vec<i16>> {
        self.transfers.lock().clone()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfer_count.load(Ordering::Relaxed)
    }

    /// Makes every following write fail.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }
}

impl BulkOutput for MockBulkOutput {
    fn write_blocking(
        &mut self,
        samples: &[i16],
        channels: u16,
        sample_rate: u32,
    ) -> Result<(), OutputError> {
        if self.disconnected.load(Ordering::Relaxed) {
            return Err(OutputError::Disconnected);
        }
        trace!(
            samples = samples.len(),
            channels,
            sample_rate,
            "Mock bulk transfer"
        );
        self.transfer_count.fetch_add(1, Ordering::Relaxed);
        if self.record {
            self.transfers.lock().push(samples.to_vec());
        }
        Ok(())
    }
}
