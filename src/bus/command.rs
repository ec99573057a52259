//! Printer-command controller (spec §7 "Printer command"): takes a single
//! semicolon-separated command string and enqueues each segment directly,
//! bypassing the job machinery entirely.
//!
//! Grounded on `original_source`'s `PrinterCommandProcessor::dispatch` and
//! `splitCommands`: trim each `;`-delimited segment, drop empty ones, fall
//! back to the whole string if splitting produced nothing usable, and
//! enqueue with no job id -- individual commands are never jobs, only
//! `PrintJobManager` creates those.

use std::sync::Arc;

use crate::bus::error::Result;
use crate::bus::messages::{PrinterCommandRequest, PrinterCommandResponse};
use crate::bus::transport::{Consumer, Producer};
use crate::queue::PriorityQueue;

pub async fn run(mut consumer: impl Consumer, producer: impl Producer, driver_id: String, queue: Arc<PriorityQueue>) -> Result<()> {
  loop {
    let raw = consumer.recv().await?;
    handle_one(&raw, &producer, &driver_id, &queue).await;
  }
}

async fn handle_one(raw: &str, producer: &impl Producer, driver_id: &str, queue: &PriorityQueue) {
  let request: PrinterCommandRequest = match serde_json::from_str(raw) {
    Ok(r) => r,
    Err(e) => {
      warn!("dropping unparseable printer-command request: {}", e);
      return;
    }
  };

  if request.driver_id != driver_id {
    return;
  }

  if !request.is_valid() {
    error!("invalid printer-command request: {}", request.request_id);
    respond(producer, driver_id, &request.request_id, false, "InvalidRequest", "Request validation failed").await;
    return;
  }

  let commands = split_commands(&request.command);
  info!("queueing {} command(s) with priority {} for request {}", commands.len(), request.priority, request.request_id);

  queue.enqueue_many(commands.iter().cloned(), request.priority, "");

  let info = format!("Commands queued for execution ({} commands)", commands.len());
  respond(producer, driver_id, &request.request_id, true, "", &info).await;
}

async fn respond(producer: &impl Producer, driver_id: &str, request_id: &str, ok: bool, exception: &str, info: &str) {
  let response = PrinterCommandResponse::new(driver_id, request_id, ok, exception, info);
  if !response.is_valid() {
    error!("built an invalid printer-command response, dropping it");
    return;
  }
  match serde_json::to_string(&response) {
    Ok(payload) => {
      if let Err(e) = producer.send(driver_id, payload).await {
        error!("failed to send printer-command response: {}", e);
      }
    }
    Err(e) => error!("failed to encode printer-command response: {}", e),
  }
}

fn split_commands(command: &str) -> Vec<String> {
  let commands: Vec<String> = command.split(';').map(|segment| segment.trim().to_string()).filter(|segment| !segment.is_empty()).collect();

  if commands.is_empty() && !command.is_empty() {
    vec![command.to_string()]
  } else {
    commands
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_on_semicolons_and_trims_each_segment() {
    assert_eq!(split_commands("M10 X1 ; M10 Y2 ;  M0"), vec!["M10 X1".to_string(), "M10 Y2".to_string(), "M0".to_string()]);
  }

  #[test]
  fn empty_segments_are_dropped() {
    assert_eq!(split_commands("M10 X1;;;M0"), vec!["M10 X1".to_string(), "M0".to_string()]);
  }

  #[test]
  fn falls_back_to_the_whole_string_when_splitting_yields_nothing() {
    assert_eq!(split_commands(";;;"), Vec::<String>::new());
  }

  #[tokio::test]
  async fn a_request_for_a_different_driver_is_ignored() {
    use crate::bus::transport::LocalBus;
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(PriorityQueue::new(dir.path().join("q.dat")));
    let (bus, mut outbound_rx) = LocalBus::new();
    let producer = bus.producer();

    let raw = r#"{"requestId":"r1","driverId":"someone-else","command":"M10 X1","priority":1}"#;
    handle_one(raw, &producer, "printer-1", &queue).await;

    assert_eq!(queue.len(), 0);
    assert!(outbound_rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn a_valid_request_enqueues_and_acknowledges() {
    use crate::bus::transport::LocalBus;
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(PriorityQueue::new(dir.path().join("q.dat")));
    let (bus, mut outbound_rx) = LocalBus::new();
    let producer = bus.producer();

    let raw = r#"{"requestId":"r1","driverId":"printer-1","command":"M10 X1;M0","priority":1}"#;
    handle_one(raw, &producer, "printer-1", &queue).await;

    assert_eq!(queue.len(), 2);
    let (driver_id, payload) = outbound_rx.recv().await.unwrap();
    assert_eq!(driver_id, "printer-1");
    let response: PrinterCommandResponse = serde_json::from_str(&payload).unwrap();
    assert!(response.ok);
  }
}
