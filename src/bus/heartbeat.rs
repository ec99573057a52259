//! Heartbeat controller (spec §7 "Heartbeat"). Answers every heartbeat poll
//! with this driver's current status code.
//!
//! Grounded on `original_source`'s `HeartbeatProcessor::processHeartbeatRequest`:
//! parse (possibly empty) request body, look up status, build and validate
//! the response, send it, log failures without propagating them -- a
//! heartbeat reply that fails to send is not worth crashing the driver over.

use std::sync::Arc;

use crate::bus::error::Result;
use crate::bus::messages::{HeartbeatRequest, HeartbeatResponse};
use crate::bus::status::heartbeat_code;
use crate::bus::transport::{Consumer, Producer};
use crate::job::PrintJobManager;

pub async fn run(mut consumer: impl Consumer, producer: impl Producer, driver_id: String, job_manager: Arc<PrintJobManager>) -> Result<()> {
  loop {
    let raw = consumer.recv().await?;
    handle_one(&raw, &producer, &driver_id, &job_manager).await;
  }
}

async fn handle_one(raw: &str, producer: &impl Producer, driver_id: &str, job_manager: &PrintJobManager) {
  if !raw.trim().is_empty() {
    if let Err(e) = serde_json::from_str::<HeartbeatRequest>(raw) {
      warn!("heartbeat request did not parse, answering anyway: {}", e);
    }
  }

  let status = heartbeat_code(job_manager.current_state());
  let response = HeartbeatResponse::new(driver_id, status);

  if !response.is_valid() {
    error!("built an invalid heartbeat response, dropping it");
    return;
  }

  match serde_json::to_string(&response) {
    Ok(payload) => {
      if let Err(e) = producer.send(driver_id, payload).await {
        error!("failed to send heartbeat response: {}", e);
      }
    }
    Err(e) => error!("failed to encode heartbeat response: {}", e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::transport::LocalBus;
  use crate::job::tracker::JobTracker;
  use crate::queue::PriorityQueue;
  use crate::state::StateTracker;
  use crate::translator::facade::{CommandResponse, Driver as DriverTrait};
  use crate::command::Category;

  struct NullDriver;
  impl DriverTrait for NullDriver {
    fn send(&self, _category: Category, _code: u32, _params: Vec<(char, String)>) -> std::result::Result<CommandResponse, String> {
      Ok(CommandResponse::default())
    }
    fn set_hotend_target(&self, _temp: f64) {}
    fn set_bed_target(&self, _temp: f64) {}
    fn note_hotend_actual(&self, _temp: f64) {}
    fn note_bed_actual(&self, _temp: f64) {}
    fn set_fan_speed(&self, _percent: u32) {}
    fn note_layer(&self, _layer: u32) {}
    fn note_position(&self, _x: f64, _y: f64, _z: f64) {}
  }

  fn job_manager() -> Arc<PrintJobManager> {
    let dir = tempfile::tempdir().unwrap();
    Arc::new(PrintJobManager::new(
      Arc::new(NullDriver),
      Arc::new(PriorityQueue::new(dir.path().join("q.dat"))),
      Arc::new(JobTracker::new()),
      Arc::new(StateTracker::new()),
      0,
    ))
  }

  #[tokio::test]
  async fn answers_with_idl_when_nothing_is_printing() {
    let (bus, mut outbound_rx) = LocalBus::new();
    let producer = bus.producer();
    handle_one("{}", &producer, "printer-1", &job_manager()).await;

    let (driver_id, payload) = outbound_rx.recv().await.unwrap();
    assert_eq!(driver_id, "printer-1");
    let response: HeartbeatResponse = serde_json::from_str(&payload).unwrap();
    assert_eq!(response.status_code, "IDL");
  }
}
