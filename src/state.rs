//! Process-wide printer state snapshot (spec §3 "Printer state snapshot").
//!
//! Grounded on `original_source`'s `StateTracker.hpp`: atomics for the
//! hot-path fields (position, feed rate, layer, fan speed, command count,
//! target temperatures) and a mutex-guarded cache with a timestamp for
//! actual temperature reads, so staleness can be checked without forcing a
//! synchronous firmware query. The source exposes this as a process-wide
//! singleton (`getInstance()`); this crate instead hands one `Arc<StateTracker>`
//! to everything that needs it, which is more testable and no less
//! "process-wide" in practice since the driver owns exactly one instance.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

struct CachedTemp {
  value: f64,
  updated_at: Option<Instant>,
}

impl Default for CachedTemp {
  fn default() -> Self {
    CachedTemp { value: 0.0, updated_at: None }
  }
}

pub struct StateTracker {
  e_position_bits: AtomicU64,
  feed_rate_bits: AtomicU64,
  current_layer: AtomicI64,
  layer_height_bits: AtomicU64,
  fan_speed: AtomicI64,
  command_count: AtomicUsize,
  hotend_target_bits: AtomicU64,
  bed_target_bits: AtomicU64,
  position: Mutex<Position>,
  hotend_actual: Mutex<CachedTemp>,
  bed_actual: Mutex<CachedTemp>,
  last_command: Mutex<String>,
}

const DEFAULT_LAYER_HEIGHT: f64 = 0.2;
const DEFAULT_FEED_RATE: f64 = 1000.0;

impl StateTracker {
  pub fn new() -> Self {
    StateTracker {
      e_position_bits: AtomicU64::new(0f64.to_bits()),
      feed_rate_bits: AtomicU64::new(DEFAULT_FEED_RATE.to_bits()),
      current_layer: AtomicI64::new(0),
      layer_height_bits: AtomicU64::new(DEFAULT_LAYER_HEIGHT.to_bits()),
      fan_speed: AtomicI64::new(0),
      command_count: AtomicUsize::new(0),
      hotend_target_bits: AtomicU64::new(0f64.to_bits()),
      bed_target_bits: AtomicU64::new(0f64.to_bits()),
      position: Mutex::new(Position::default()),
      hotend_actual: Mutex::new(CachedTemp::default()),
      bed_actual: Mutex::new(CachedTemp::default()),
      last_command: Mutex::new(String::new()),
    }
  }

  pub fn update_e_position(&self, e: f64) {
    self.e_position_bits.store(e.to_bits(), Ordering::SeqCst);
  }

  pub fn current_e_position(&self) -> f64 {
    f64::from_bits(self.e_position_bits.load(Ordering::SeqCst))
  }

  pub fn update_position(&self, x: f64, y: f64, z: f64) {
    *self.position.lock().unwrap() = Position { x, y, z };
  }

  pub fn position(&self) -> Position {
    *self.position.lock().unwrap()
  }

  pub fn update_feed_rate(&self, feed: f64) {
    self.feed_rate_bits.store(feed.to_bits(), Ordering::SeqCst);
  }

  pub fn current_feed_rate(&self) -> f64 {
    f64::from_bits(self.feed_rate_bits.load(Ordering::SeqCst))
  }

  pub fn increment_layer(&self) {
    self.current_layer.fetch_add(1, Ordering::SeqCst);
  }

  pub fn set_current_layer(&self, layer: i64) {
    self.current_layer.store(layer, Ordering::SeqCst);
  }

  pub fn current_layer(&self) -> i64 {
    self.current_layer.load(Ordering::SeqCst)
  }

  pub fn set_layer_height(&self, height: f64) {
    self.layer_height_bits.store(height.to_bits(), Ordering::SeqCst);
  }

  pub fn current_layer_height(&self) -> f64 {
    f64::from_bits(self.layer_height_bits.load(Ordering::SeqCst))
  }

  pub fn update_fan_speed(&self, speed: i64) {
    self.fan_speed.store(speed, Ordering::SeqCst);
  }

  pub fn current_fan_speed(&self) -> i64 {
    self.fan_speed.load(Ordering::SeqCst)
  }

  pub fn set_hotend_target_temp(&self, temp: f64) {
    self.hotend_target_bits.store(temp.to_bits(), Ordering::SeqCst);
  }

  pub fn set_bed_target_temp(&self, temp: f64) {
    self.bed_target_bits.store(temp.to_bits(), Ordering::SeqCst);
  }

  pub fn hotend_target_temp(&self) -> f64 {
    f64::from_bits(self.hotend_target_bits.load(Ordering::SeqCst))
  }

  pub fn bed_target_temp(&self) -> f64 {
    f64::from_bits(self.bed_target_bits.load(Ordering::SeqCst))
  }

  pub fn update_hotend_actual_temp(&self, temp: f64) {
    let mut cached = self.hotend_actual.lock().unwrap();
    cached.value = temp;
    cached.updated_at = Some(Instant::now());
  }

  pub fn is_hotend_temp_fresh(&self, max_age: Duration) -> bool {
    match self.hotend_actual.lock().unwrap().updated_at {
      Some(at) => at.elapsed() < max_age,
      None => false,
    }
  }

  pub fn cached_hotend_temp(&self) -> f64 {
    self.hotend_actual.lock().unwrap().value
  }

  pub fn update_bed_actual_temp(&self, temp: f64) {
    let mut cached = self.bed_actual.lock().unwrap();
    cached.value = temp;
    cached.updated_at = Some(Instant::now());
  }

  pub fn is_bed_temp_fresh(&self, max_age: Duration) -> bool {
    match self.bed_actual.lock().unwrap().updated_at {
      Some(at) => at.elapsed() < max_age,
      None => false,
    }
  }

  pub fn cached_bed_temp(&self) -> f64 {
    self.bed_actual.lock().unwrap().value
  }

  pub fn update_last_command(&self, cmd: impl Into<String>) {
    *self.last_command.lock().unwrap() = cmd.into();
  }

  pub fn last_command(&self) -> String {
    self.last_command.lock().unwrap().clone()
  }

  pub fn increment_command_count(&self) {
    self.command_count.fetch_add(1, Ordering::SeqCst);
  }

  pub fn command_count(&self) -> usize {
    self.command_count.load(Ordering::SeqCst)
  }

  /// Resets the job-scoped fields ahead of a new print (spec §4.5
  /// "LOADING" entry action). Target/actual temperatures and fan speed are
  /// left alone: the firmware doesn't reset them between jobs.
  pub fn reset_for_new_job(&self) {
    self.update_e_position(0.0);
    self.set_current_layer(0);
    self.command_count.store(0, Ordering::SeqCst);
    self.set_layer_height(DEFAULT_LAYER_HEIGHT);
    self.update_last_command("");
  }
}

impl Default for StateTracker {
  fn default() -> Self {
    StateTracker::new()
  }
}
