//! Printer-check controller (spec §7 "Printer check"): a full snapshot of
//! printer + job state, all fields stringified per the original's
//! `PrinterCheckResponseDto`.
//!
//! Grounded on `original_source`'s `PrinterCheckProcessor`: position,
//! temperatures, fan and job-progress fields come from whatever is already
//! tracked (`StateTracker`, `JobTracker`, `PriorityQueue::statistics`) with
//! no new firmware round trip, except for endstop diagnostics, which the
//! original also queries live via `M119`.

use std::sync::Arc;

use crate::bus::error::Result;
use crate::bus::messages::{PrinterCheckRequest, PrinterCheckResponse};
use crate::bus::status::{job_status_code, printer_status_code};
use crate::bus::transport::{Consumer, Producer};
use crate::command::Category;
use crate::job::PrintJobManager;
use crate::queue::PriorityQueue;
use crate::state::StateTracker;
use crate::translator::facade::Driver;

pub async fn run(
  mut consumer: impl Consumer,
  producer: impl Producer,
  driver_id: String,
  driver: Arc<dyn Driver>,
  queue: Arc<PriorityQueue>,
  job_manager: Arc<PrintJobManager>,
  state: Arc<StateTracker>,
) -> Result<()> {
  loop {
    let raw = consumer.recv().await?;
    handle_one(&raw, &producer, &driver_id, &driver, &queue, &job_manager, &state).await;
  }
}

async fn handle_one(
  raw: &str,
  producer: &impl Producer,
  driver_id: &str,
  driver: &Arc<dyn Driver>,
  queue: &PriorityQueue,
  job_manager: &PrintJobManager,
  state: &StateTracker,
) {
  let request: PrinterCheckRequest = match serde_json::from_str(raw) {
    Ok(r) => r,
    Err(e) => {
      warn!("dropping unparseable printer-check request: {}", e);
      return;
    }
  };

  if request.driver_id != driver_id {
    return;
  }

  if !request.is_valid() {
    error!("invalid printer-check request for job: {}", request.job_id);
    return;
  }

  let response = build_response(&request, driver_id, driver, queue, job_manager, state);
  send(producer, driver_id, response).await;
}

fn build_response(
  request: &PrinterCheckRequest,
  driver_id: &str,
  driver: &Arc<dyn Driver>,
  queue: &PriorityQueue,
  job_manager: &PrintJobManager,
  state: &StateTracker,
) -> PrinterCheckResponse {
  let job_state = job_manager.current_state();
  let stats = queue.statistics();
  let position = state.position();
  let progress = job_manager.progress();

  let mut response = PrinterCheckResponse {
    job_id: request.job_id.clone(),
    driver_id: driver_id.to_string(),
    job_status_code: job_status_code(job_state, stats.current_queue_size).to_string(),
    printer_status_code: printer_status_code(job_state).to_string(),

    x_position: position.x.to_string(),
    y_position: position.y.to_string(),
    z_position: position.z.to_string(),
    e_position: state.current_e_position().to_string(),

    feed: state.current_feed_rate().to_string(),
    layer: state.current_layer().to_string(),
    layer_height: state.current_layer_height().to_string(),

    extruder_status: "READY".to_string(),
    extruder_temp: state.cached_hotend_temp().to_string(),

    bed_temp: state.cached_bed_temp().to_string(),

    fan_status: "READY".to_string(),
    fan_speed: state.current_fan_speed().to_string(),

    command_offset: progress.executed_lines.to_string(),
    last_command: state.last_command(),

    average_speed: stats.total_executed.to_string(),

    exceptions: String::new(),
    logs: String::new(),
  };

  collect_diagnostics(driver, &mut response);
  response
}

fn collect_diagnostics(driver: &Arc<dyn Driver>, response: &mut PrinterCheckResponse) {
  match driver.send(Category::Endstop, 10, vec![]) {
    Ok(result) => {
      let mut exceptions = String::new();
      let mut logs = String::new();
      for line in &result.body {
        if line.contains("TRIGGERED") && !line.contains("NOT_TRIGGERED") {
          exceptions.push_str("ENDSTOP_TRIGGERED;");
        }
        logs.push_str(line);
        logs.push(';');
      }
      response.exceptions = exceptions;
      response.logs = logs;
    }
    Err(e) => {
      warn!("endstop diagnostics query failed during printer check: {}", e);
      response.exceptions = "ENDSTOP_ERROR".to_string();
    }
  }
}

async fn send(producer: &impl Producer, driver_id: &str, response: PrinterCheckResponse) {
  if !response.is_valid() {
    error!("built an invalid printer-check response, dropping it");
    return;
  }
  match serde_json::to_string(&response) {
    Ok(payload) => {
      if let Err(e) = producer.send(driver_id, payload).await {
        error!("failed to send printer-check response: {}", e);
      }
    }
    Err(e) => error!("failed to encode printer-check response: {}", e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::transport::LocalBus;
  use crate::job::tracker::JobTracker;
  use crate::translator::facade::CommandResponse;

  struct StubDriver;
  impl Driver for StubDriver {
    fn send(&self, _category: Category, _code: u32, _params: Vec<(char, String)>) -> std::result::Result<CommandResponse, String> {
      Ok(CommandResponse { body: vec!["X:NOT_TRIGGERED Y:NOT_TRIGGERED Z:NOT_TRIGGERED".to_string()] })
    }
    fn set_hotend_target(&self, _temp: f64) {}
    fn set_bed_target(&self, _temp: f64) {}
    fn note_hotend_actual(&self, _temp: f64) {}
    fn note_bed_actual(&self, _temp: f64) {}
    fn set_fan_speed(&self, _percent: u32) {}
    fn note_layer(&self, _layer: u32) {}
    fn note_position(&self, _x: f64, _y: f64, _z: f64) {}
  }

  #[tokio::test]
  async fn reports_idl_and_unk_job_status_with_no_active_job() {
    let (bus, mut outbound_rx) = LocalBus::new();
    let producer = bus.producer();
    let driver: Arc<dyn Driver> = Arc::new(StubDriver);
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(PriorityQueue::new(dir.path().join("q.dat")));
    let state = Arc::new(StateTracker::new());
    let job_manager = Arc::new(PrintJobManager::new(driver.clone(), queue.clone(), Arc::new(JobTracker::new()), state.clone(), 0));

    let raw = r#"{"driverId":"printer-1","jobId":"job-1"}"#;
    handle_one(raw, &producer, "printer-1", &driver, &queue, &job_manager, &state).await;

    let (_id, payload) = outbound_rx.recv().await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(response["printerStatusCode"], "IDL");
    assert_eq!(response["jobStatusCode"], "UNK");
  }
}
