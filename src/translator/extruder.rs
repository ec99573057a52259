//! Extruder dispatcher (spec §4.3): `G10` retract, `G11` extrude.
//!
//! Grounded on `original_source`'s `ExtruderDispatcher.cpp` (opcode set,
//! `L`/`F` gcode parameter names and their defaults) and
//! `ExtruderCommands.cpp` (wire codes `A10`/`A20`, wire parameter letters
//! `E`/`F`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{format_f64, Category};

use super::facade::Driver;
use super::{Dispatcher, Error, Result};

pub struct ExtruderDispatcher {
  driver: Arc<dyn Driver>,
}

impl ExtruderDispatcher {
  pub fn new(driver: Arc<dyn Driver>) -> Self {
    ExtruderDispatcher { driver }
  }
}

impl Dispatcher for ExtruderDispatcher {
  fn can_handle(&self, opcode: &str) -> bool {
    matches!(opcode, "G10" | "G11")
  }

  fn validate(&self, _opcode: &str, _params: &HashMap<char, f64>) -> bool {
    true
  }

  fn handle(&self, opcode: &str, params: &HashMap<char, f64>) -> Result<()> {
    let length = *params.get(&'L').unwrap_or(&5.0);
    let feedrate = *params.get(&'F').unwrap_or(&300.0);
    let code = if opcode == "G10" { 20 } else { 10 };

    self
      .driver
      .send(Category::Extruder, code, vec![('E', format_f64(length)), ('F', format_f64(feedrate))])
      .map(|_| ())
      .map_err(|e| Error::DriverError(opcode.to_string(), e))
  }
}
