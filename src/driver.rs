//! Production implementation of `translator::facade::Driver` (spec §4.3's
//! "driver façade"), the one seam where a rendered category/code/param
//! triple turns into an actual `N<n> ... *<cs>` exchange with the firmware.
//!
//! Grounded on the teacher crate's split between a thin command type and
//! the code that sends it: here that's `command::CommandRecord::new` for
//! rendering plus `serial::ProtocolEngine::send_and_await` for the
//! exchange. Every successful send also updates the state tracker fields
//! `StateTracker::increment_command_count`/`update_last_command` track for
//! every command, not just the category-specific ones the dispatchers
//! already update themselves.

use std::sync::Arc;

use crate::command::{Category, CommandRecord, Param};
use crate::serial::{ProtocolEngine, SendOutcome};
use crate::state::StateTracker;
use crate::translator::facade::{CommandResponse, Driver as DriverTrait};

pub struct Driver {
  engine: Arc<ProtocolEngine>,
  state: Arc<StateTracker>,
}

impl Driver {
  pub fn new(engine: Arc<ProtocolEngine>, state: Arc<StateTracker>) -> Self {
    Driver { engine, state }
  }
}

impl DriverTrait for Driver {
  fn send(&self, category: Category, code: u32, params: Vec<(char, String)>) -> Result<CommandResponse, String> {
    let number = self.engine.next_number();
    let params: Vec<Param> = params.into_iter().map(|(letter, value)| Param::new(letter, value)).collect();
    let record = CommandRecord::new(number, category, code, params);

    let outcome = self.engine.send_and_await(number, &record.rendered_text).map_err(|e| e.to_string())?;

    self.state.increment_command_count();
    self.state.update_last_command(&record.rendered_text);

    match outcome {
      SendOutcome::Success { body, .. } => Ok(CommandResponse { body }),
      SendOutcome::ResendFailed(reason) => {
        warn!("{}", reason);
        Ok(CommandResponse::default())
      }
      SendOutcome::Error(raw) => Err(raw),
    }
  }

  fn set_hotend_target(&self, temp: f64) {
    self.state.set_hotend_target_temp(temp);
  }

  fn set_bed_target(&self, temp: f64) {
    self.state.set_bed_target_temp(temp);
  }

  fn note_hotend_actual(&self, temp: f64) {
    self.state.update_hotend_actual_temp(temp);
  }

  fn note_bed_actual(&self, temp: f64) {
    self.state.update_bed_actual_temp(temp);
  }

  fn set_fan_speed(&self, percent: u32) {
    self.state.update_fan_speed(percent as i64);
  }

  fn note_layer(&self, layer: u32) {
    self.state.set_current_layer(layer as i64);
  }

  fn note_position(&self, x: f64, y: f64, z: f64) {
    self.state.update_position(x, y, z);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::serial::EngineConfig;
  use std::io::Write;
  use std::sync::mpsc::channel;
  use std::time::Duration;

  struct NullWriter;
  impl Write for NullWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn successful_send_bumps_command_count_and_last_command() {
    let (tx, rx) = channel();
    let mut cfg = EngineConfig::default();
    cfg.attempt_timeout = Duration::from_millis(200);
    cfg.poll_interval = Duration::from_millis(10);
    let engine = Arc::new(ProtocolEngine::new(Box::new(NullWriter), rx, cfg));
    tx.send("System ready.".to_string()).unwrap();
    engine.wait_for_ready(Duration::from_millis(200)).unwrap();

    let state = Arc::new(StateTracker::new());
    let driver = Driver::new(engine, state.clone());

    tx.send("OK0 N1 *5".to_string()).unwrap();
    let response = driver.send(Category::Motion, 10, vec![('X', "10".to_string())]).unwrap();
    assert!(response.body.is_empty());
    assert_eq!(state.command_count(), 1);
    assert!(state.last_command().starts_with("N1 M10 X10"));
  }

  #[test]
  fn note_position_and_targets_reach_state_tracker() {
    let (_tx, rx) = channel();
    let engine = Arc::new(ProtocolEngine::new(Box::new(NullWriter), rx, EngineConfig::default()));
    let state = Arc::new(StateTracker::new());
    let driver = Driver::new(engine, state.clone());

    driver.note_position(1.0, 2.0, 3.0);
    driver.set_hotend_target(210.0);
    driver.set_bed_target(60.0);
    driver.note_hotend_actual(205.5);
    driver.set_fan_speed(80);
    driver.note_layer(4);

    assert_eq!(state.position(), crate::state::Position { x: 1.0, y: 2.0, z: 3.0 });
    assert_eq!(state.hotend_target_temp(), 210.0);
    assert_eq!(state.bed_target_temp(), 60.0);
    assert_eq!(state.cached_hotend_temp(), 205.5);
    assert_eq!(state.current_fan_speed(), 80);
    assert_eq!(state.current_layer(), 4);
  }
}
