use err_derive::Error;

#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  #[error(display = "job already active: {}", _0)]
  AlreadyActive(String),

  #[error(display = "no job to act on")]
  NoActiveJob,

  #[error(display = "printer not ready to print: {}", _0)]
  NotReadyToPrint(String),

  #[error(display = "cannot open G-code file: {}", _0)]
  FileOpen(String),

  #[error(display = "download failed: {}", _0)]
  DownloadFailed(String),

  #[error(display = "invalid state transition: {} -> {}", _0, _1)]
  InvalidTransition(String, String),
}

pub type Result<T> = std::result::Result<T, Error>;
