use std::io;

use err_derive::Error;

#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  #[error(display = "error opening serial port: {:?}", _0)]
  SerialPortError(#[error(source)] serialport::Error),

  #[error(display = "error reading from serial port: {}", _0)]
  ReadError(#[source] io::Error),

  #[error(display = "error writing to serial port: {}", _0)]
  WriteError(#[source] io::Error),

  #[error(display = "error sending to channel")]
  ChannelSendError,

  #[error(display = "{}", _0)]
  Error(String),

  #[error(display = "max retries exceeded for N{}", _0)]
  MaxRetriesExceeded(u16),

  #[error(display = "not ready - firmware has not sent the ready banner")]
  NotReady,

  #[error(display = "critical message processing error: {}", _0)]
  CriticalProcessingError(String),

  #[error(display = "serial reader thread disconnected")]
  ChannelDisconnected,
}

pub type Result<T> = std::result::Result<T, Error>;
