//! The boundary between G-code dispatchers and the rest of the driver.
//!
//! Dispatchers never touch the protocol engine or the queue directly; they
//! call through this trait exactly as the original dispatcher classes call
//! through `DriverInterface`'s per-category command objects
//! (`MotionCommands`, `TemperatureCommands`, ...). `crate::driver::Driver`
//! is the production implementation; tests use an in-memory double.

use crate::command::Category;

/// The body lines returned by the firmware for a request, already ACKed by
/// the protocol engine. Dispatchers that need to parse a value out of the
/// response (position, temperature, endstop status) read this.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResponse {
  pub body: Vec<String>,
}

/// Everything a dispatcher needs from the rest of the driver: sending a
/// rendered command through the queue/protocol engine, and updating the
/// process-wide state tracker when a command that changes it succeeds.
pub trait Driver: Send + Sync {
  fn send(&self, category: Category, code: u32, params: Vec<(char, String)>) -> Result<CommandResponse, String>;

  fn set_hotend_target(&self, temp: f64);
  fn set_bed_target(&self, temp: f64);
  fn note_hotend_actual(&self, temp: f64);
  fn note_bed_actual(&self, temp: f64);
  fn set_fan_speed(&self, percent: u32);
  fn note_layer(&self, layer: u32);
  fn note_position(&self, x: f64, y: f64, z: f64);
}
