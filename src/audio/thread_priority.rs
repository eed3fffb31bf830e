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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the sample timer thread when TAKTINATOR_THREAD_PRIORITY is unset.
const DEFAULT_TIMER_THREAD_PRIORITY: u8 = 70;

/// Reads TAKTINATOR_THREAD_PRIORITY (0-99). Out of range or unparsable values fall
/// back to the default.
pub fn timer_thread_priority() -> Option<ThreadPriorityValue> {
    std::env::var("TAKTINATOR_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_TIMER_THREAD_PRIORITY).ok())
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether the sample timer thread should try SCHED_FIFO.
/// Opt out with TAKTINATOR_DISABLE_RT_TIMER=1.
pub fn rt_timer_enabled() -> bool {
    !env_flag("TAKTINATOR_DISABLE_RT_TIMER")
}

/// Raises the priority of the calling thread so sample ticks stay evenly spaced.
/// Failures are logged and otherwise ignored.
pub fn configure_timer_thread_priority() {
    let Some(priority) = timer_thread_priority() else {
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    let _ = set_current_thread_priority(tp);

    #[cfg(unix)]
    if rt_timer_enabled() {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for sample timer thread"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for sample timer thread"),
        }
    }
}
