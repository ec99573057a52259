//! Three-tier priority command queue (spec §4.4).
//!
//! Grounded on `original_source`'s `CommandExecutorQueue.cpp`: a hot
//! in-memory heap feeds the executor, a spill heap absorbs producer
//! bursts, and a disk segment is the unbounded cold tier. Paging and
//! refilling happen under one mutex; the executor blocks on a condition
//! variable rather than busy-polling.

pub mod disk;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Condvar, Mutex};

use disk::DiskSegment;

/// Target size the hot heap is paged down to once it reaches capacity
/// (half of `MAX_COMMANDS_IN_RAM`, per source).
pub const MAX_COMMANDS_IN_RAM: usize = 10_000;
pub const PAGING_BUFFER_SIZE: usize = 5_000;
const REFILL_BATCH: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityCommand {
  pub command: String,
  pub priority: i32,
  pub job_id: String,
  pub sequence_id: u64,
}

/// Lower `priority` values and lower `sequence_id`s sort first out of the
/// heap; `BinaryHeap` is a max-heap, so both comparisons are reversed.
impl Ord for PriorityCommand {
  fn cmp(&self, other: &Self) -> Ordering {
    other.priority.cmp(&self.priority).then_with(|| other.sequence_id.cmp(&self.sequence_id))
  }
}

impl PartialOrd for PriorityCommand {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
  pub total_enqueued: u64,
  pub total_executed: u64,
  pub total_errors: u64,
  pub current_queue_size: usize,
  pub disk_paged_commands: u64,
  pub disk_operations: u64,
}

struct Inner {
  hot: BinaryHeap<PriorityCommand>,
  spill: BinaryHeap<PriorityCommand>,
  disk: DiskSegment,
  stats: Statistics,
  stopping: bool,
}

impl Inner {
  fn total_len(&self) -> usize {
    self.hot.len() + self.spill.len() + self.disk.len()
  }

  /// Moves excess elements from hot down to `MAX_COMMANDS_IN_RAM / 2` into
  /// spill, then flushes spill to disk once it reaches capacity.
  fn page_to_spill(&mut self) {
    let target = MAX_COMMANDS_IN_RAM / 2;
    while self.hot.len() > target {
      if let Some(cmd) = self.hot.pop() {
        self.spill.push(cmd);
      }
    }

    if self.spill.len() >= PAGING_BUFFER_SIZE && self.disk.is_available() {
      self.flush_spill_to_disk();
    }

    debug!("paged commands - hot: {}, spill: {}", self.hot.len(), self.spill.len());
  }

  fn flush_spill_to_disk(&mut self) {
    let mut flushed = 0u64;
    while let Some(cmd) = self.spill.pop() {
      if self.disk.push(cmd).is_ok() {
        flushed += 1;
        self.stats.disk_operations += 1;
      }
    }
    self.stats.disk_paged_commands += flushed;
    info!("flushed {} commands to disk", flushed);
  }

  fn refill_from_spill(&mut self) {
    let mut loaded = 0;
    while loaded < REFILL_BATCH {
      match self.spill.pop() {
        Some(cmd) => {
          self.hot.push(cmd);
          loaded += 1;
        }
        None => break,
      }
    }
    if loaded > 0 {
      debug!("loaded {} commands from spill", loaded);
    }
  }

  fn refill_from_disk(&mut self) {
    let batch = self.disk.pop_batch(REFILL_BATCH);
    if !batch.is_empty() {
      debug!("loaded {} commands from disk", batch.len());
    }
    for cmd in batch {
      self.hot.push(cmd);
    }
  }
}

/// Three-tier priority command queue: hot heap, spill heap, disk segment.
pub struct PriorityQueue {
  inner: Mutex<Inner>,
  not_empty: Condvar,
  next_sequence_id: AtomicU64,
}

impl PriorityQueue {
  pub fn new(disk_path: impl Into<PathBuf>) -> Self {
    PriorityQueue {
      inner: Mutex::new(Inner {
        hot: BinaryHeap::new(),
        spill: BinaryHeap::new(),
        disk: DiskSegment::open(disk_path),
        stats: Statistics::default(),
        stopping: false,
      }),
      not_empty: Condvar::new(),
      next_sequence_id: AtomicU64::new(1),
    }
  }

  /// Enqueues one command. Rejects (with a warning, not an error) only
  /// when both in-memory tiers are full and the disk segment is
  /// unavailable, per the §4.4 failure model.
  pub fn enqueue(&self, command: impl Into<String>, priority: i32, job_id: impl Into<String>) {
    let command = command.into();
    if command.trim().is_empty() {
      warn!("empty command ignored");
      return;
    }

    let sequence_id = self.next_sequence_id.fetch_add(1, AtomicOrdering::SeqCst);
    let cmd = PriorityCommand { command, priority, job_id: job_id.into(), sequence_id };

    let mut inner = self.inner.lock().unwrap();
    if inner.stopping {
      warn!("rejecting command - queue is stopping");
      return;
    }

    if inner.hot.len() >= MAX_COMMANDS_IN_RAM && inner.spill.len() >= PAGING_BUFFER_SIZE && !inner.disk.is_available() {
      warn!("rejecting command - RAM capacity exceeded and disk paging unavailable");
      return;
    }

    inner.hot.push(cmd);
    inner.stats.total_enqueued += 1;

    if inner.hot.len() >= MAX_COMMANDS_IN_RAM {
      inner.page_to_spill();
    }

    drop(inner);
    self.not_empty.notify_one();
  }

  pub fn enqueue_many<I>(&self, commands: I, priority: i32, job_id: &str)
  where
    I: IntoIterator<Item = String>,
  {
    for command in commands {
      self.enqueue(command, priority, job_id.to_string());
    }
  }

  /// Blocks until a command is available or the queue has been told to
  /// stop and has fully drained, refilling from spill/disk first.
  pub fn dequeue(&self) -> Option<PriorityCommand> {
    let mut inner = self.inner.lock().unwrap();
    loop {
      if inner.hot.is_empty() && !inner.spill.is_empty() {
        inner.refill_from_spill();
      }
      if inner.hot.is_empty() && inner.spill.is_empty() && !inner.disk.is_empty() {
        inner.refill_from_disk();
      }

      if !inner.hot.is_empty() {
        let cmd = inner.hot.pop();
        return cmd;
      }

      if inner.stopping && inner.spill.is_empty() && inner.disk.is_empty() {
        return None;
      }

      inner = self.not_empty.wait(inner).unwrap();
    }
  }

  pub fn stop(&self) {
    let mut inner = self.inner.lock().unwrap();
    inner.stopping = true;
    drop(inner);
    self.not_empty.notify_all();
  }

  pub fn record_executed(&self) {
    self.inner.lock().unwrap().stats.total_executed += 1;
  }

  pub fn record_error(&self) {
    self.inner.lock().unwrap().stats.total_errors += 1;
  }

  pub fn len(&self) -> usize {
    self.inner.lock().unwrap().total_len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    let mut inner = self.inner.lock().unwrap();
    let cleared = inner.total_len();
    inner.hot.clear();
    inner.spill.clear();
    inner.disk.clear();
    if cleared > 0 {
      info!("cleared {} pending commands", cleared);
    }
  }

  pub fn statistics(&self) -> Statistics {
    let inner = self.inner.lock().unwrap();
    let mut stats = inner.stats.clone();
    stats.current_queue_size = inner.total_len();
    stats
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn queue() -> (PriorityQueue, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let queue = PriorityQueue::new(dir.path().join("command_queue.dat"));
    (queue, dir)
  }

  #[test]
  fn total_order_by_priority_then_sequence() {
    let (queue, _dir) = queue();
    queue.enqueue("low", 5, "job");
    queue.enqueue("high", 1, "job");
    queue.enqueue("mid-a", 3, "job");
    queue.enqueue("mid-b", 3, "job");

    let order: Vec<String> = (0..4).map(|_| queue.dequeue().unwrap().command).collect();
    assert_eq!(order, vec!["high", "mid-a", "mid-b", "low"]);
  }

  #[test]
  fn paging_moves_excess_to_spill() {
    let (queue, _dir) = queue();
    for i in 0..(MAX_COMMANDS_IN_RAM + 10) {
      queue.enqueue(format!("cmd{}", i), 5, "job");
    }
    assert_eq!(queue.len(), MAX_COMMANDS_IN_RAM + 10);

    let inner = queue.inner.lock().unwrap();
    assert!(inner.hot.len() <= MAX_COMMANDS_IN_RAM / 2 + 1);
    assert!(!inner.spill.is_empty());
  }

  #[test]
  fn stop_unblocks_dequeue_once_drained() {
    let (queue, _dir) = queue();
    queue.stop();
    assert!(queue.dequeue().is_none());
  }

  #[test]
  fn statistics_track_enqueue_and_execution() {
    let (queue, _dir) = queue();
    queue.enqueue("cmd", 5, "job");
    queue.dequeue();
    queue.record_executed();

    let stats = queue.statistics();
    assert_eq!(stats.total_enqueued, 1);
    assert_eq!(stats.total_executed, 1);
    assert_eq!(stats.current_queue_size, 0);
  }
}
