//! Queue processor worker (spec §5 worker table: "Queue processor | 1 |
//! queue condition variable").
//!
//! Grounded on `original_source`'s `CommandExecutorQueue::processingLoop`:
//! blocking dequeue, update the job tracker's progress counter before
//! dispatch, translate, record statistics, then poll whether the active job
//! just finished. Runs on its own OS thread since `PriorityQueue::dequeue`
//! blocks synchronously.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::job::PrintJobManager;
use crate::queue::PriorityQueue;
use crate::translator::GCodeTranslator;

/// A `;LAYER:<n>` marker, the slicer convention for announcing a new layer.
/// Not gated behind a dispatcher since it is a comment, stripped before the
/// translator ever sees the line; the executor has to look at the raw text.
fn parse_layer_marker(raw: &str) -> Option<u32> {
  let trimmed = raw.trim_start();
  let rest = trimmed.strip_prefix(";LAYER:")?;
  rest.trim().parse::<u32>().ok()
}

/// Spawns the queue processor thread. Exits once `queue` is stopped and
/// fully drained.
pub fn spawn(
  queue: Arc<PriorityQueue>,
  translator: Arc<GCodeTranslator>,
  job_manager: Arc<PrintJobManager>,
  on_layer: Arc<dyn Fn(u32) + Send + Sync>,
) -> JoinHandle<()> {
  thread::spawn(move || {
    info!("queue processor started");

    while let Some(cmd) = queue.dequeue() {
      if let Some(layer) = parse_layer_marker(&cmd.command) {
        on_layer(layer);
      }

      if !cmd.job_id.is_empty() {
        job_manager.record_line_executed();
      }

      match translator.parse_line(&cmd.command) {
        Some(Ok(())) => {
          queue.record_executed();
        }
        Some(Err(e)) => {
          queue.record_error();
          error!("command execution failed ({}): {}", cmd.command, e);
        }
        None => {
          queue.record_executed();
        }
      }

      job_manager.poll_completion();
    }

    info!("queue processor stopped");
  })
}
