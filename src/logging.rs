//! Structured logging bootstrap (SPEC_FULL.md ambient stack: "structured
//! logging... with a daily-rotating file appender under `logs/`").
//!
//! The rest of the crate logs through the `log` facade (the teacher crate's
//! choice); here that's bridged onto `tracing` so a single daily-rotating
//! file sink, as used across the retrieval pack's `tracing-appender`
//! consumers, backs every `info!`/`warn!`/`error!`/`debug!` call site
//! without touching any of them.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Initializes the global logger. The returned `WorkerGuard` must be held
/// for the lifetime of the process (dropping it stops the background
/// flush thread and truncates the last buffered lines), so `main` keeps it
/// bound rather than discarding it.
pub fn init(log_dir: &str) -> WorkerGuard {
  let file_appender = rolling::daily(log_dir, "driver.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_writer(non_blocking.and(std::io::stderr))
    .with_ansi(false)
    .with_target(true)
    .init();

  tracing_log::LogTracer::init().expect("LogTracer can only be installed once per process");

  guard
}
