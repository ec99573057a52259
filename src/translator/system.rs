//! System dispatcher (spec §4.3): `G28` home, `M24` start, `M25` pause,
//! `M26` resume, `M105` status, `M112` brutal reset, `M999` emergency
//! reset.
//!
//! Grounded on `original_source`'s `SystemDispatcher.cpp` for the opcode
//! set. That file's dispatch methods (`homing`, `startPrint`, `pause`,
//! `resume`, `printStatus`, `brutalReset`, `emergencyReset`) sit over a
//! different `SystemCommands` class than the one checked into this pack
//! (which only exposes `S0`/`S10`); this dispatcher assigns the remaining
//! `S`-codes itself, in opcode declaration order, documented as an open
//! decision rather than copied from a source file.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::Category;

use super::facade::Driver;
use super::{Dispatcher, Error, Result};

pub struct SystemDispatcher {
  driver: Arc<dyn Driver>,
}

impl SystemDispatcher {
  pub fn new(driver: Arc<dyn Driver>) -> Self {
    SystemDispatcher { driver }
  }

  fn code_for(opcode: &str) -> u32 {
    match opcode {
      "G28" => 0, // home
      "M24" => 1, // start
      "M25" => 2, // pause
      "M26" => 3, // resume
      "M105" => 4, // status
      "M112" => 5, // brutal reset
      "M999" => 6, // emergency reset
      _ => unreachable!("can_handle gates the opcode set"),
    }
  }
}

impl Dispatcher for SystemDispatcher {
  fn can_handle(&self, opcode: &str) -> bool {
    matches!(opcode, "G28" | "M24" | "M25" | "M26" | "M105" | "M112" | "M999")
  }

  fn validate(&self, _opcode: &str, _params: &HashMap<char, f64>) -> bool {
    true
  }

  fn handle(&self, opcode: &str, _params: &HashMap<char, f64>) -> Result<()> {
    self
      .driver
      .send(Category::System, Self::code_for(opcode), vec![])
      .map(|_| ())
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
    sent: Mutex<Vec<(Category, u32)>>,
  }

  impl Driver for RecordingDriver {
    fn send(&self, category: Category, code: u32, _params: Vec<(char, String)>) -> std::result::Result<CommandResponse, String> {
      self.sent.lock().unwrap().push((category, code));
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
  fn every_opcode_maps_to_a_distinct_code() {
    let driver = Arc::new(RecordingDriver::default());
    let dispatcher = SystemDispatcher::new(driver.clone());
    for opcode in ["G28", "M24", "M25", "M26", "M105", "M112", "M999"] {
      dispatcher.handle(opcode, &HashMap::new()).unwrap();
    }
    let sent = driver.sent.lock().unwrap();
    let codes: std::collections::HashSet<_> = sent.iter().map(|(_, c)| *c).collect();
    assert_eq!(codes.len(), 7);
  }
}
