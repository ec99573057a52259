//! Job progress registry (spec §4.5, "progress"), independent of the
//! single-job lifecycle state machine in `manager.rs`.
//!
//! Grounded on `original_source`'s `JobTracker.hpp`/`.cpp`: a map keyed by
//! job id, progress percentage derived from executed/total commands, and a
//! retention cap so the map doesn't grow without bound across many print
//! jobs over the driver's lifetime.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cap on retained completed/failed/cancelled job records (source:
/// `MAX_COMPLETED_JOBS`).
const MAX_RETAINED_TERMINAL_JOBS: usize = 100;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrackedState {
  Running,
  Paused,
  Loading,
  Heating,
  Completed,
  Failed,
  Cancelled,
}

impl TrackedState {
  fn is_terminal(self) -> bool {
    matches!(self, TrackedState::Completed | TrackedState::Failed | TrackedState::Cancelled)
  }

  fn is_active(self) -> bool {
    matches!(self, TrackedState::Running | TrackedState::Paused | TrackedState::Loading | TrackedState::Heating)
  }
}

#[derive(Debug, Clone)]
pub struct JobInfo {
  pub job_id: String,
  pub state: TrackedState,
  pub start_time: Instant,
  pub last_update: Instant,
  pub total_commands: usize,
  pub executed_commands: usize,
  pub current_command: String,
  pub error: String,
}

impl JobInfo {
  pub fn progress_percent(&self) -> f32 {
    if self.total_commands == 0 {
      0.0
    } else {
      (self.executed_commands as f32 / self.total_commands as f32) * 100.0
    }
  }

  pub fn elapsed(&self) -> Duration {
    self.last_update.saturating_duration_since(self.start_time).max(self.start_time.elapsed())
  }
}

#[derive(Debug, Clone, Default)]
pub struct Statistics {
  pub total_jobs: u64,
  pub completed_jobs: u64,
  pub failed_jobs: u64,
  pub cancelled_jobs: u64,
}

#[derive(Default)]
struct Inner {
  jobs: HashMap<String, JobInfo>,
  current_job_id: Option<String>,
  stats: Statistics,
}

#[derive(Default)]
pub struct JobTracker {
  inner: Mutex<Inner>,
}

impl JobTracker {
  pub fn new() -> Self {
    JobTracker::default()
  }

  pub fn start_job(&self, job_id: &str, total_commands: usize) {
    let now = Instant::now();
    let mut inner = self.inner.lock().unwrap();
    inner.jobs.insert(
      job_id.to_string(),
      JobInfo {
        job_id: job_id.to_string(),
        state: TrackedState::Running,
        start_time: now,
        last_update: now,
        total_commands,
        executed_commands: 0,
        current_command: String::new(),
        error: String::new(),
      },
    );
    inner.current_job_id = Some(job_id.to_string());
    inner.stats.total_jobs += 1;
    info!("started job: {} ({} commands)", job_id, total_commands);
  }

  pub fn update_progress(&self, job_id: &str, current_command: &str) {
    let mut inner = self.inner.lock().unwrap();
    let mut auto_complete = false;
    if let Some(job) = inner.jobs.get_mut(job_id) {
      job.executed_commands += 1;
      job.current_command = current_command.to_string();
      job.last_update = Instant::now();
      if job.executed_commands >= job.total_commands && job.state == TrackedState::Running {
        auto_complete = true;
      }
    }
    if auto_complete {
      self.set_state(&mut inner, job_id, TrackedState::Completed);
    }
  }

  pub fn complete_job(&self, job_id: &str) {
    let mut inner = self.inner.lock().unwrap();
    self.set_state(&mut inner, job_id, TrackedState::Completed);
    inner.stats.completed_jobs += 1;
    if inner.current_job_id.as_deref() == Some(job_id) {
      inner.current_job_id = None;
    }
    self.evict_excess_terminal_jobs(&mut inner);
    info!("completed job: {}", job_id);
  }

  pub fn fail_job(&self, job_id: &str, error: &str) {
    let mut inner = self.inner.lock().unwrap();
    if let Some(job) = inner.jobs.get_mut(job_id) {
      job.error = error.to_string();
    }
    self.set_state(&mut inner, job_id, TrackedState::Failed);
    inner.stats.failed_jobs += 1;
    if inner.current_job_id.as_deref() == Some(job_id) {
      inner.current_job_id = None;
    }
    self.evict_excess_terminal_jobs(&mut inner);
    error!("failed job: {} - {}", job_id, error);
  }

  pub fn pause_job(&self, job_id: &str) {
    let mut inner = self.inner.lock().unwrap();
    self.set_state(&mut inner, job_id, TrackedState::Paused);
  }

  pub fn resume_job(&self, job_id: &str) {
    let mut inner = self.inner.lock().unwrap();
    self.set_state(&mut inner, job_id, TrackedState::Running);
  }

  pub fn cancel_job(&self, job_id: &str) {
    let mut inner = self.inner.lock().unwrap();
    self.set_state(&mut inner, job_id, TrackedState::Cancelled);
    inner.stats.cancelled_jobs += 1;
    if inner.current_job_id.as_deref() == Some(job_id) {
      inner.current_job_id = None;
    }
    self.evict_excess_terminal_jobs(&mut inner);
  }

  pub fn job_info(&self, job_id: &str) -> Option<JobInfo> {
    self.inner.lock().unwrap().jobs.get(job_id).cloned()
  }

  pub fn active_jobs(&self) -> Vec<JobInfo> {
    self.inner.lock().unwrap().jobs.values().filter(|j| j.state.is_active()).cloned().collect()
  }

  pub fn has_active_job(&self) -> bool {
    self.inner.lock().unwrap().current_job_id.is_some()
  }

  pub fn current_job_id(&self) -> Option<String> {
    self.inner.lock().unwrap().current_job_id.clone()
  }

  pub fn statistics(&self) -> Statistics {
    self.inner.lock().unwrap().stats.clone()
  }

  fn set_state(&self, inner: &mut Inner, job_id: &str, state: TrackedState) {
    if let Some(job) = inner.jobs.get_mut(job_id) {
      job.state = state;
      job.last_update = Instant::now();
    }
  }

  fn evict_excess_terminal_jobs(&self, inner: &mut Inner) {
    let mut terminal: Vec<(String, Instant)> =
      inner.jobs.iter().filter(|(_, j)| j.state.is_terminal()).map(|(id, j)| (id.clone(), j.last_update)).collect();

    if terminal.len() <= MAX_RETAINED_TERMINAL_JOBS {
      return;
    }

    terminal.sort_by_key(|(_, last_update)| *last_update);
    let to_remove = terminal.len() - MAX_RETAINED_TERMINAL_JOBS;
    for (id, _) in terminal.into_iter().take(to_remove) {
      inner.jobs.remove(&id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn auto_completes_when_all_commands_executed() {
    let tracker = JobTracker::new();
    tracker.start_job("job-1", 2);
    tracker.update_progress("job-1", "N1 M10 *1");
    assert_eq!(tracker.job_info("job-1").unwrap().state, TrackedState::Running);
    tracker.update_progress("job-1", "N2 M10 *2");
    assert_eq!(tracker.job_info("job-1").unwrap().state, TrackedState::Completed);
  }

  #[test]
  fn retains_at_most_cap_terminal_jobs() {
    let tracker = JobTracker::new();
    for i in 0..(MAX_RETAINED_TERMINAL_JOBS + 20) {
      let id = format!("job-{}", i);
      tracker.start_job(&id, 1);
      tracker.complete_job(&id);
    }

    let remaining = tracker.inner.lock().unwrap().jobs.len();
    assert_eq!(remaining, MAX_RETAINED_TERMINAL_JOBS);
  }

  #[test]
  fn progress_percent_computation() {
    let tracker = JobTracker::new();
    tracker.start_job("job-1", 4);
    tracker.update_progress("job-1", "a");
    let info = tracker.job_info("job-1").unwrap();
    assert_eq!(info.progress_percent(), 25.0);
  }
}
