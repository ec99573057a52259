//! Environment-variable configuration loader (spec §6 "Environment
//! configuration").
//!
//! Grounded on `original_source`'s `ConfigManager`: `SCREAMING_SNAKE_CASE`
//! environment variables with typed parsing and a hardcoded default for
//! every tuning knob. `SERIAL_PORT` and `DRIVER_ID` have no sensible
//! default and are a startup error when absent, matching the rest of the
//! crate's fail-fast posture on missing required state.

use std::env;
use std::time::Duration;

use err_derive::Error;

#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  #[error(display = "missing required environment variable: {}", _0)]
  MissingRequired(String),

  #[error(display = "invalid value for {}: {}", _0, _1)]
  InvalidValue(String, String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct Config {
  pub serial_port: String,
  pub serial_baud_rate: u32,
  pub driver_id: String,
  pub driver_location: String,

  pub bus_broker_url: String,
  pub bus_username: Option<String>,
  pub bus_password: Option<String>,

  pub queue_max_commands_in_ram: usize,
  pub queue_paging_buffer_size: usize,
  pub queue_disk_path: String,

  pub serial_max_attempts: u32,
  pub serial_attempt_timeout: Duration,
  pub serial_busy_sleep: Duration,
  pub serial_critical_timeout: Duration,
  pub serial_poll_interval: Duration,

  pub temperature_freshness: Duration,
  pub download_max_attempts: u32,
}

impl Config {
  /// Loads configuration from the process environment, falling back to the
  /// spec-given defaults for anything not set. `SERIAL_PORT` and
  /// `DRIVER_ID` are required.
  pub fn from_env() -> Result<Self> {
    Ok(Config {
      serial_port: require("SERIAL_PORT")?,
      serial_baud_rate: parse_or("SERIAL_BAUDRATE", 115_200)?,
      driver_id: require("DRIVER_ID")?,
      driver_location: env::var("DRIVER_LOCATION").unwrap_or_default(),

      bus_broker_url: env::var("BUS_BROKER_URL").unwrap_or_else(|_| "local".to_string()),
      bus_username: env::var("BUS_USERNAME").ok(),
      bus_password: env::var("BUS_PASSWORD").ok(),

      queue_max_commands_in_ram: parse_or("QUEUE_MAX_COMMANDS_IN_RAM", 10_000)?,
      queue_paging_buffer_size: parse_or("QUEUE_PAGING_BUFFER_SIZE", 5_000)?,
      queue_disk_path: env::var("QUEUE_DISK_PATH").unwrap_or_else(|_| "temp/command_queue.dat".to_string()),

      serial_max_attempts: parse_or("SERIAL_MAX_RETRIES", 5)?,
      serial_attempt_timeout: Duration::from_millis(parse_or("SERIAL_ATTEMPT_TIMEOUT_MS", 5000)?),
      serial_busy_sleep: Duration::from_millis(parse_or("SERIAL_BUSY_SLEEP_MS", 100)?),
      serial_critical_timeout: Duration::from_millis(parse_or("SERIAL_CRITICAL_TIMEOUT_MS", 5000)?),
      serial_poll_interval: Duration::from_millis(parse_or("SERIAL_POLL_INTERVAL_MS", 100)?),

      temperature_freshness: Duration::from_millis(parse_or("TEMPERATURE_FRESHNESS_MS", 3000)?),
      download_max_attempts: parse_or("DOWNLOAD_MAX_ATTEMPTS", 0)?,
    })
  }
}

fn require(name: &str) -> Result<String> {
  env::var(name).map_err(|_| Error::MissingRequired(name.to_string()))
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
  T: std::str::FromStr,
{
  match env::var(name) {
    Ok(raw) => raw.parse::<T>().map_err(|_| Error::InvalidValue(name.to_string(), raw)),
    Err(_) => Ok(default),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  // Environment variables are process-global; serialize tests that touch them.
  static ENV_LOCK: Mutex<()> = Mutex::new(());

  #[test]
  fn missing_serial_port_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    env::remove_var("SERIAL_PORT");
    env::remove_var("DRIVER_ID");
    let result = Config::from_env();
    assert!(matches!(result, Err(Error::MissingRequired(name)) if name == "SERIAL_PORT"));
  }

  #[test]
  fn defaults_are_applied_when_optional_vars_are_unset() {
    let _guard = ENV_LOCK.lock().unwrap();
    env::set_var("SERIAL_PORT", "/dev/ttyUSB0");
    env::set_var("DRIVER_ID", "printer-1");
    env::remove_var("QUEUE_MAX_COMMANDS_IN_RAM");

    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.queue_max_commands_in_ram, 10_000);
    assert_eq!(cfg.serial_baud_rate, 115_200);

    env::remove_var("SERIAL_PORT");
    env::remove_var("DRIVER_ID");
  }

  #[test]
  fn invalid_numeric_override_is_reported() {
    let _guard = ENV_LOCK.lock().unwrap();
    env::set_var("SERIAL_PORT", "/dev/ttyUSB0");
    env::set_var("DRIVER_ID", "printer-1");
    env::set_var("SERIAL_BAUDRATE", "not-a-number");

    let result = Config::from_env();
    assert!(matches!(result, Err(Error::InvalidValue(name, _)) if name == "SERIAL_BAUDRATE"));

    env::remove_var("SERIAL_PORT");
    env::remove_var("DRIVER_ID");
    env::remove_var("SERIAL_BAUDRATE");
  }
}
