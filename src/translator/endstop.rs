//! Endstop dispatcher (spec §4.3): `M119` -> `E10`, response body carries
//! `TRIGGERED`/`NOT_TRIGGERED` tokens per axis.
//!
//! Grounded on `original_source`'s `EndstopDispatcher.cpp` and
//! `EndstopCommands.cpp`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::Category;

use super::facade::Driver;
use super::{Dispatcher, Error, Result};

pub struct EndstopDispatcher {
  driver: Arc<dyn Driver>,
}

impl EndstopDispatcher {
  pub fn new(driver: Arc<dyn Driver>) -> Self {
    EndstopDispatcher { driver }
  }
}

impl Dispatcher for EndstopDispatcher {
  fn can_handle(&self, opcode: &str) -> bool {
    opcode == "M119"
  }

  fn validate(&self, _opcode: &str, _params: &HashMap<char, f64>) -> bool {
    true
  }

  fn handle(&self, opcode: &str, _params: &HashMap<char, f64>) -> Result<()> {
    self
      .driver
      .send(Category::Endstop, 10, vec![])
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
      assert_eq!(category, Category::Endstop);
      assert_eq!(code, 10);
      Ok(CommandResponse { body: vec!["X:NOT_TRIGGERED Y:TRIGGERED Z:NOT_TRIGGERED".to_string()] })
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
  fn m119_issues_e10() {
    let dispatcher = EndstopDispatcher::new(Arc::new(StubDriver));
    dispatcher.handle("M119", &HashMap::new()).unwrap();
  }
}
