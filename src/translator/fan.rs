//! Fan dispatcher (spec §4.3): `M106` set speed, `M107` off.
//!
//! Grounded on `original_source`'s `FanDispatcher.cpp` (opcode set,
//! percent-as-int truncation) and `FanCommands.cpp` (wire codes `F10`/`F0`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::Category;

use super::facade::Driver;
use super::{Dispatcher, Error, Result};

pub struct FanDispatcher {
  driver: Arc<dyn Driver>,
}

impl FanDispatcher {
  pub fn new(driver: Arc<dyn Driver>) -> Self {
    FanDispatcher { driver }
  }
}

impl Dispatcher for FanDispatcher {
  fn can_handle(&self, opcode: &str) -> bool {
    matches!(opcode, "M106" | "M107")
  }

  fn validate(&self, opcode: &str, params: &HashMap<char, f64>) -> bool {
    if opcode == "M106" {
      params.contains_key(&'S')
    } else {
      true
    }
  }

  fn handle(&self, opcode: &str, params: &HashMap<char, f64>) -> Result<()> {
    let speed = if opcode == "M106" { params[&'S'] as u32 } else { 0 };
    let code = if opcode == "M106" { 10 } else { 0 };

    self
      .driver
      .send(Category::Fan, code, vec![('S', speed.to_string())])
      .map(|_| self.driver.set_fan_speed(speed))
      .map_err(|e| Error::DriverError(opcode.to_string(), e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::translator::CommandResponse;
  use std::sync::Mutex;

  #[derive(Default)]
  struct RecordingDriver {
    sent: Mutex<Vec<(Category, u32, Vec<(char, String)>)>>,
    fan_speed: Mutex<Option<u32>>,
  }

  impl Driver for RecordingDriver {
    fn send(&self, category: Category, code: u32, params: Vec<(char, String)>) -> std::result::Result<CommandResponse, String> {
      self.sent.lock().unwrap().push((category, code, params));
      Ok(CommandResponse::default())
    }
    fn set_hotend_target(&self, _temp: f64) {}
    fn set_bed_target(&self, _temp: f64) {}
    fn note_hotend_actual(&self, _temp: f64) {}
    fn note_bed_actual(&self, _temp: f64) {}
    fn set_fan_speed(&self, percent: u32) {
      *self.fan_speed.lock().unwrap() = Some(percent);
    }
    fn note_layer(&self, _layer: u32) {}
    fn note_position(&self, _x: f64, _y: f64, _z: f64) {}
  }

  #[test]
  fn m106_requires_speed_param() {
    let driver = Arc::new(RecordingDriver::default());
    let dispatcher = FanDispatcher::new(driver);
    assert!(!dispatcher.validate("M106", &HashMap::new()));
  }

  #[test]
  fn m107_turns_fan_off() {
    let driver = Arc::new(RecordingDriver::default());
    let dispatcher = FanDispatcher::new(driver.clone());
    dispatcher.handle("M107", &HashMap::new()).unwrap();
    assert_eq!(*driver.fan_speed.lock().unwrap(), Some(0));
    assert_eq!(driver.sent.lock().unwrap()[0].1, 0);
  }
}
