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
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    thread::{self, JoinHandle, Thread},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, span, warn, Level};

use super::buffer::{AudioBuffer, SampleEncoding};
use super::error::PlaybackError;
use super::interrupt::{DacOutput, InterruptPusher, SampleTimer};
use super::thread_priority;
use super::PlaybackDriver;

/// How long a disabled timer thread sleeps between checks.
const IDLE_PARK: Duration = Duration::from_millis(10);

struct TimerState {
    period_us: AtomicU32,
    enabled: AtomicBool,
    shutdown: AtomicBool,
    thread: Mutex<Option<Thread>>,
}

/// A periodic sample timer emulated with a high priority thread and spin sleeping.
/// Used on hosts that have no hardware timer interrupt.
#[derive(Clone)]
pub struct ThreadTimer {
    state: Arc<TimerState>,
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadTimer {
    pub fn new() -> ThreadTimer {
        ThreadTimer {
            state: Arc::new(TimerState {
                period_us: AtomicU32::new(1_000),
                enabled: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                thread: Mutex::new(None),
            }),
        }
    }

    /// Starts the timer thread. `handler` runs once per period while the timer is enabled.
    pub fn attach<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn() + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let join = thread::spawn(move || {
            let span = span!(Level::INFO, "sample timer");
            let _enter = span.enter();
            thread_priority::configure_timer_thread_priority();

            let mut next = Instant::now();
            while !state.shutdown.load(Ordering::Relaxed) {
                if !state.enabled.load(Ordering::Acquire) {
                    thread::park_timeout(IDLE_PARK);
                    next = Instant::now();
                    continue;
                }

                let period = Duration::from_micros(u64::from(
                    state.period_us.load(Ordering::Relaxed).max(1),
                ));
                next += period;
                handler();

                let now = Instant::now();
                if next > now {
                    spin_sleep::sleep(next - now);
                } else {
                    // Fell behind, don't try to catch up with a burst of ticks.
                    next = now;
                }
            }
            debug!("Sample timer stopped");
        });
        *self.state.thread.lock() = Some(join.thread().clone());
        join
    }

    /// Stops the timer thread for good.
    pub fn shutdown(&self) {
        self.state.shutdown.store(true, Ordering::Relaxed);
        self.wake();
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    fn wake(&self) {
        if let Some(thread) = self.state.thread.lock().as_ref() {
            thread.unpark();
        }
    }
}

impl SampleTimer for ThreadTimer {
    fn set_period_us(&mut self, period_us: u32) {
        self.state.period_us.store(period_us, Ordering::Relaxed);
    }

    fn enable(&mut self) {
        self.state.enabled.store(true, Ordering::Release);
        self.wake();
    }

    fn disable(&mut self) {
        self.state.enabled.store(false, Ordering::Release);
    }
}

/// An [`InterruptPusher`] whose interrupts come from its own [`ThreadTimer`]. The
/// timer thread lives exactly as long as the pusher.
pub struct TimerDrivenPusher<D: DacOutput> {
    pusher: InterruptPusher<ThreadTimer, D>,
    timer: ThreadTimer,
    thread: Option<JoinHandle<()>>,
}

impl<D: DacOutput + 'static> TimerDrivenPusher<D> {
    pub fn new(dac: D) -> TimerDrivenPusher<D> {
        let timer = ThreadTimer::new();
        let pusher = InterruptPusher::new(timer.clone(), dac);
        let handle = pusher.handle();
        let thread = timer.attach(move || handle.on_tick());
        TimerDrivenPusher {
            pusher,
            timer,
            thread: Some(thread),
        }
    }

    /// True while the timer thread is alive.
    pub fn is_timer_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl<D: DacOutput> Drop for TimerDrivenPusher<D> {
    fn drop(&mut self) {
        self.timer.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Sample timer thread panicked");
            }
        }
    }
}

impl<D: DacOutput + 'static> PlaybackDriver for TimerDrivenPusher<D> {
    fn encoding(&self) -> SampleEncoding {
        self.pusher.encoding()
    }

    fn play(&mut self, buffer: &Arc<AudioBuffer>) -> Result<(), PlaybackError> {
        self.pusher.play(buffer)
    }

    fn set_volume(&mut self, volume: u8) {
        self.pusher.set_volume(volume);
    }

    fn volume(&self) -> u8 {
        self.pusher.volume()
    }

    fn is_playing(&self) -> bool {
        self.pusher.is_playing()
    }
}
