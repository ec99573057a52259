//! History dispatcher (spec §4.3): `M702` clears the firmware's own command
//! history (distinct from this crate's `serial::CommandHistory`).
//!
//! Grounded on `original_source`'s `HistoryDispatcher.cpp` and
//! `HistoryCommands.cpp` (`H0`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::Category;

use super::facade::Driver;
use super::{Dispatcher, Error, Result};

pub struct HistoryDispatcher {
  driver: Arc<dyn Driver>,
}

impl HistoryDispatcher {
  pub fn new(driver: Arc<dyn Driver>) -> Self {
    HistoryDispatcher { driver }
  }
}

impl Dispatcher for HistoryDispatcher {
  fn can_handle(&self, opcode: &str) -> bool {
    opcode == "M702"
  }

  fn validate(&self, _opcode: &str, _params: &HashMap<char, f64>) -> bool {
    true
  }

  fn handle(&self, opcode: &str, _params: &HashMap<char, f64>) -> Result<()> {
    self
      .driver
      .send(Category::History, 0, vec![])
      .map(|_| ())
      .map_err(|e| Error::DriverError(opcode.to_string(), e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::translator::CommandResponse;

  struct StubDriver;
  impl Driver for StubDriver {
    fn send(&self, category: Category, code: u32, _params: Vec<(char, String)>) -> std::result::Result<CommandResponse, String> {
      assert_eq!(category, Category::History);
      assert_eq!(code, 0);
      Ok(CommandResponse::default())
    }
    fn set_hotend_target(&self, _temp: f64) {}
    fn set_bed_target(&self, _temp: f64) {}
    fn note_hotend_actual(&self, _temp: f64) {}
    fn note_bed_actual(&self, _temp: f64) {}
    fn set_fan_speed(&self, _percent: u32) {}
    fn note_layer(&self, _layer: u32) {}
    fn note_position(&self, _x: f64, _y: f64, _z: f64) {}
  }

  #[test]
  fn m702_issues_h0() {
    let dispatcher = HistoryDispatcher::new(Arc::new(StubDriver));
    dispatcher.handle("M702", &HashMap::new()).unwrap();
  }
}
