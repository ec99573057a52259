//! Printer-control controller (spec §7 "Printer control"): start/stop/pause
//! a print job from the bus.
//!
//! Grounded on `original_source`'s `PrinterControlProcessor`: run any
//! `startGCode` as high-priority control commands ahead of the job itself,
//! then start from `gcodeUrl` if given (falling back to "already done" when
//! the start G-code was the whole job), mark the job failed if starting
//! didn't work, and for stop/pause just forward into the job manager.
//! Responses aren't part of this topic in the original (start/stop/pause
//! are fire-and-forget; status is read back via printer-check), so this
//! controller never publishes anything.

use std::sync::Arc;

use crate::bus::error::Result;
use crate::bus::messages::{PrinterPauseRequest, PrinterStartRequest, PrinterStopRequest};
use crate::bus::transport::Consumer;
use crate::job::{PrintJobManager, CONTROL_PRIORITY};
use crate::job::tracker::JobTracker;
use crate::queue::PriorityQueue;

pub async fn run_start(
  mut consumer: impl Consumer,
  driver_id: String,
  queue: Arc<PriorityQueue>,
  job_manager: Arc<PrintJobManager>,
  job_tracker: Arc<JobTracker>,
) -> Result<()> {
  loop {
    let raw = consumer.recv().await?;
    handle_start(&raw, &driver_id, &queue, &job_manager, &job_tracker).await;
  }
}

pub async fn run_stop(mut consumer: impl Consumer, driver_id: String, job_manager: Arc<PrintJobManager>) -> Result<()> {
  loop {
    let raw = consumer.recv().await?;
    handle_stop(&raw, &driver_id, &job_manager);
  }
}

pub async fn run_pause(mut consumer: impl Consumer, driver_id: String, job_manager: Arc<PrintJobManager>) -> Result<()> {
  loop {
    let raw = consumer.recv().await?;
    handle_pause(&raw, &driver_id, &job_manager);
  }
}

async fn handle_start(raw: &str, driver_id: &str, queue: &PriorityQueue, job_manager: &Arc<PrintJobManager>, job_tracker: &JobTracker) {
  let request: PrinterStartRequest = match serde_json::from_str(raw) {
    Ok(r) => r,
    Err(e) => {
      warn!("dropping unparseable printer-start request: {}", e);
      return;
    }
  };

  if request.driver_id != driver_id || !request.is_valid() {
    return;
  }

  let job_id = generate_job_id(driver_id);
  info!("processing start request for driver {}, job {}", driver_id, job_id);

  if !request.start_gcode.is_empty() {
    info!("executing start G-code for job {}", job_id);
    enqueue_gcode_sequence(&request.start_gcode, &job_id, queue);
  }

  let success = if !request.gcode_url.is_empty() {
    info!("starting print from URL: {}", request.gcode_url);
    job_manager.start_print_job_from_url(&request.gcode_url, &job_id).await.is_ok()
  } else {
    !request.start_gcode.is_empty()
  };

  if success {
    info!("print job started: {}", job_id);
  } else {
    error!("failed to start print job: {}", job_id);
    job_tracker.fail_job(&job_id, "START_FAILED");
  }
}

fn handle_stop(raw: &str, driver_id: &str, job_manager: &PrintJobManager) {
  let request: PrinterStopRequest = match serde_json::from_str(raw) {
    Ok(r) => r,
    Err(e) => {
      warn!("dropping unparseable printer-stop request: {}", e);
      return;
    }
  };

  if request.driver_id != driver_id || !request.is_valid() {
    return;
  }

  if let Err(e) = job_manager.cancel_job() {
    warn!("stop request had nothing to cancel: {}", e);
  }
}

fn handle_pause(raw: &str, driver_id: &str, job_manager: &PrintJobManager) {
  let request: PrinterPauseRequest = match serde_json::from_str(raw) {
    Ok(r) => r,
    Err(e) => {
      warn!("dropping unparseable printer-pause request: {}", e);
      return;
    }
  };

  if request.driver_id != driver_id || !request.is_valid() {
    return;
  }

  if let Err(e) = job_manager.pause_job() {
    warn!("pause request rejected: {}", e);
  }
}

fn enqueue_gcode_sequence(gcode: &str, job_id: &str, queue: &PriorityQueue) {
  let commands: Vec<String> = gcode
    .lines()
    .map(|line| line.trim())
    .filter(|line| !line.is_empty() && !line.starts_with(';'))
    .map(|line| line.to_string())
    .collect();

  if !commands.is_empty() {
    info!("enqueued {} control commands for job {}", commands.len(), job_id);
    queue.enqueue_many(commands, CONTROL_PRIORITY, job_id);
  }
}

fn generate_job_id(driver_id: &str) -> String {
  format!("{}_job_{}", driver_id, chrono::Utc::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_start_gcode_into_non_comment_non_empty_lines() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PriorityQueue::new(dir.path().join("q.dat"));
    enqueue_gcode_sequence("; comment\nM10 X1\n\nM0", "job-1", &queue);
    assert_eq!(queue.len(), 2);
  }

  #[test]
  fn an_all_comment_sequence_enqueues_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PriorityQueue::new(dir.path().join("q.dat"));
    enqueue_gcode_sequence(";just a comment", "job-1", &queue);
    assert_eq!(queue.len(), 0);
  }
}
