//! Process entry point (SPEC_FULL.md ambient stack, §6 "CLI"): loads
//! configuration, opens the serial link, wires the queue/translator/job
//! manager/remote-bus stack together, and runs until `SIGINT`/`SIGTERM`.
//!
//! Grounded on the teacher crate's `main.rs` (`structopt::StructOpt` for
//! flags, `anyhow::Result` for the top-level error type) adapted from a
//! single-sensor poll loop to this driver's multi-worker startup sequence.
//! The remote bus is wired to the in-process `bus::transport::LocalBus`
//! (see `bus::transport`'s doc comment) since a real broker client is out
//! of scope; swapping one in means replacing this file's bus setup, not
//! anything under `bus::check`/`command`/`control`/`heartbeat`.

#[macro_use]
extern crate log;

use std::sync::Arc;
use std::sync::mpsc::channel;
use std::time::Duration;

use anyhow::{Context, Result};
use structopt::StructOpt;

use printer_driver_core::bus::transport::LocalBus;
use printer_driver_core::bus::{check, command, control, heartbeat};
use printer_driver_core::command::Category;
use printer_driver_core::driver::Driver as DriverImpl;
use printer_driver_core::job::{JobTracker, PrintJobManager};
use printer_driver_core::queue::PriorityQueue;
use printer_driver_core::serial::{self, EngineConfig, ProtocolEngine};
use printer_driver_core::state::StateTracker;
use printer_driver_core::translator::facade::Driver as DriverTrait;
use printer_driver_core::translator::GCodeTranslator;
use printer_driver_core::{executor, logging, monitor::SystemMonitor, Config};

#[derive(Debug, StructOpt)]
#[structopt(name = "printer-driver")]
struct Options {
  /// directory daily-rotated log files are written under
  #[structopt(long, default_value = "logs")]
  log_dir: String,

  /// how long to wait for the firmware's ready banner before giving up
  #[structopt(long, default_value = "30")]
  ready_timeout_secs: u64,
}

fn engine_config(cfg: &Config) -> EngineConfig {
  EngineConfig {
    max_attempts: cfg.serial_max_attempts,
    attempt_timeout: cfg.serial_attempt_timeout,
    busy_sleep: cfg.serial_busy_sleep,
    critical_timeout: cfg.serial_critical_timeout,
    poll_interval: cfg.serial_poll_interval,
    ..EngineConfig::default()
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let opts = Options::from_args();
  let _logging_guard = logging::init(&opts.log_dir);

  let cfg = Config::from_env().context("loading configuration from the environment")?;
  info!("starting printer driver {} on {}", cfg.driver_id, cfg.serial_port);

  let (read_port, write_port) =
    serial::port::open(&cfg.serial_port, cfg.serial_baud_rate, cfg.serial_attempt_timeout).context("opening serial port")?;

  let (line_tx, line_rx) = channel();
  let _reader_handle = serial::port::spawn_reader_thread(read_port, line_tx);

  let engine = Arc::new(ProtocolEngine::new(Box::new(write_port), line_rx, engine_config(&cfg)));
  {
    let engine = engine.clone();
    let timeout = Duration::from_secs(opts.ready_timeout_secs);
    tokio::task::spawn_blocking(move || engine.wait_for_ready(timeout))
      .await
      .context("joining ready-banner wait")?
      .context("firmware never sent its ready banner")?;
  }
  info!("firmware ready");

  let state = Arc::new(StateTracker::new());
  let driver: Arc<dyn DriverTrait> = Arc::new(DriverImpl::new(engine.clone(), state.clone()));
  let translator = Arc::new(GCodeTranslator::with_default_dispatchers(driver.clone()));
  let queue = Arc::new(PriorityQueue::new(cfg.queue_disk_path.clone()));
  let job_tracker = Arc::new(JobTracker::new());
  let job_manager = Arc::new(PrintJobManager::new(driver.clone(), queue.clone(), job_tracker.clone(), state.clone(), cfg.download_max_attempts));

  let layer_state = state.clone();
  let executor_handle = executor::spawn(queue.clone(), translator.clone(), job_manager.clone(), Arc::new(move |layer: u32| {
    layer_state.set_current_layer(layer as i64);
  }));

  let (monitor, monitor_handle) = SystemMonitor::start(queue.clone(), state.clone());

  let (bus, mut outbound_rx) = LocalBus::new();
  let driver_id = cfg.driver_id.clone();

  let outbound_logger = tokio::spawn(async move {
    while let Some((id, payload)) = outbound_rx.recv().await {
      debug!("published response for {}: {}", id, payload);
    }
  });

  let heartbeat_task = tokio::spawn(heartbeat::run(bus.consumer(&bus.heartbeat_requests), bus.producer(), driver_id.clone(), job_manager.clone()));
  let command_task = tokio::spawn(command::run(bus.consumer(&bus.command_requests), bus.producer(), driver_id.clone(), queue.clone()));
  let check_task = tokio::spawn(check::run(
    bus.consumer(&bus.check_requests),
    bus.producer(),
    driver_id.clone(),
    driver.clone(),
    queue.clone(),
    job_manager.clone(),
    state.clone(),
  ));
  let start_task = tokio::spawn(control::run_start(
    bus.consumer(&bus.start_requests),
    driver_id.clone(),
    queue.clone(),
    job_manager.clone(),
    job_tracker.clone(),
  ));
  let stop_task = tokio::spawn(control::run_stop(bus.consumer(&bus.stop_requests), driver_id.clone(), job_manager.clone()));
  let pause_task = tokio::spawn(control::run_pause(bus.consumer(&bus.pause_requests), driver_id.clone(), job_manager.clone()));

  wait_for_shutdown_signal().await;
  info!("shutdown signal received, draining queue");

  heartbeat_task.abort();
  command_task.abort();
  check_task.abort();
  start_task.abort();
  stop_task.abort();
  pause_task.abort();
  outbound_logger.abort();

  monitor.stop();
  queue.stop();

  if let Err(e) = tokio::task::spawn_blocking(move || executor_handle.join()).await {
    warn!("queue processor thread panicked while draining: {:?}", e);
  }
  if let Err(e) = tokio::task::spawn_blocking(move || monitor_handle.join()).await {
    warn!("system monitor thread panicked while stopping: {:?}", e);
  }

  // M999 emergency reset (translator::system's S-code table) keeps the
  // firmware from sitting mid-move if the queue had an in-flight command
  // when shutdown was requested.
  let _ = driver.send(Category::System, 6, vec![]);

  info!("printer driver shut down cleanly");
  Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
  use tokio::signal::unix::{signal, SignalKind};

  let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
  let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

  tokio::select! {
    _ = sigterm.recv() => info!("received SIGTERM"),
    _ = sigint.recv() => info!("received SIGINT"),
  }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
  let _ = tokio::signal::ctrl_c().await;
  info!("received ctrl-c");
}
