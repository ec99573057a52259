use err_derive::Error;

#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  #[error(display = "failed to parse message: {}", _0)]
  Parse(String),

  #[error(display = "transport send failed: {}", _0)]
  SendFailed(String),

  #[error(display = "transport closed")]
  Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
