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

/// Default priority for the drain loop thread when SYNTHPUMP_THREAD_PRIORITY is unset.
const DEFAULT_LOOP_THREAD_PRIORITY: u8 = 70;

/// Reads SYNTHPUMP_THREAD_PRIORITY (0-99), falling back to the default.
pub fn loop_thread_priority() -> ThreadPriorityValue {
    let priority = parse_priority(std::env::var("SYNTHPUMP_THREAD_PRIORITY").ok().as_deref());
    ThreadPriorityValue::try_from(priority)
        .unwrap_or_else(|_| ThreadPriorityValue::try_from(DEFAULT_LOOP_THREAD_PRIORITY).unwrap())
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_LOOP_THREAD_PRIORITY)
}

fn is_truthy(value: &str) -> bool {
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the drain loop thread.
/// Default: enabled. Opt out with SYNTHPUMP_DISABLE_RT=1.
pub fn rt_enabled() -> bool {
    !env_flag("SYNTHPUMP_DISABLE_RT")
}

/// Raises the priority of the calling thread, which should be the one running
/// the drain loop. Failures are logged and otherwise ignored.
pub fn configure_loop_thread_priority(priority: ThreadPriorityValue, rt: bool) {
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to raise drain loop thread priority");
    }

    #[cfg(unix)]
    if rt {
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
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for drain loop thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for drain loop thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt;
}
