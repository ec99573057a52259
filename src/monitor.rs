//! System monitor worker (spec §5 worker table: "System monitor | 1 |
//! sleep(1 s)"), given one concrete job per SPEC_FULL.md: snapshot queue
//! and job statistics once a second, log them, and flag a protocol engine
//! that has gone quiet while work is still pending.
//!
//! Grounded on `original_source`'s `SystemMonitor` (a dedicated thread,
//! `running_` flag, `monitorLoop`/`checkHardwareStatus` split); this crate
//! swaps `checkHardwareStatus`'s hardware polling for a stall check against
//! `StateTracker::command_count`, since the protocol engine already owns
//! hardware liveness via the ready-banner/reset-banner state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::queue::PriorityQueue;
use crate::state::StateTracker;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long the queue may be non-empty with no command-count progress
/// before the monitor logs a stall warning.
const STALL_THRESHOLD: Duration = Duration::from_secs(15);

pub struct SystemMonitor {
  running: Arc<AtomicBool>,
}

impl SystemMonitor {
  /// Spawns the monitor thread, returning a handle that can stop it.
  pub fn start(queue: Arc<PriorityQueue>, state: Arc<StateTracker>) -> (Self, JoinHandle<()>) {
    let running = Arc::new(AtomicBool::new(true));
    let running_for_thread = running.clone();

    let handle = thread::spawn(move || {
      info!("system monitor started");
      let mut last_command_count = state.command_count();
      let mut stalled_since: Option<std::time::Instant> = None;

      while running_for_thread.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let stats = queue.statistics();
        let command_count = state.command_count();
        info!(
          "queue size={} executed={} errors={} disk_paged={} | commands sent={}",
          stats.current_queue_size, stats.total_executed, stats.total_errors, stats.disk_paged_commands, command_count
        );

        if command_count == last_command_count && stats.current_queue_size > 0 {
          let since = stalled_since.get_or_insert_with(std::time::Instant::now);
          if since.elapsed() >= STALL_THRESHOLD {
            warn!(
              "protocol engine appears stalled: {} commands pending, no progress in {:?}",
              stats.current_queue_size,
              since.elapsed()
            );
          }
        } else {
          stalled_since = None;
        }

        last_command_count = command_count;
      }

      info!("system monitor stopped");
    });

    (SystemMonitor { running }, handle)
  }

  pub fn stop(&self) {
    self.running.store(false, Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stop_flips_the_running_flag() {
    let running = Arc::new(AtomicBool::new(true));
    let monitor = SystemMonitor { running: running.clone() };
    monitor.stop();
    assert!(!running.load(Ordering::SeqCst));
  }
}
