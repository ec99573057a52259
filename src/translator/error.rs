use err_derive::Error;

#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  #[error(display = "unknown opcode: {}", _0)]
  UnknownOpcode(String),

  #[error(display = "invalid opcode: {}", _0)]
  InvalidOpcode(String),

  #[error(display = "driver error while handling {}: {}", _0, _1)]
  DriverError(String, String),
}

pub type Result<T> = std::result::Result<T, Error>;
