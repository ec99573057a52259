//! Transport-agnostic pub/sub seam for the remote message bus (spec §7).
//!
//! The original runs these over a broker (Kafka-like topics keyed by
//! `driverId`); a real broker client is out of scope here, so this module
//! defines the `Consumer`/`Producer` traits a controller needs and a
//! `local` in-process implementation backed by `tokio::sync::broadcast` and
//! `mpsc`, grounded on the other retrieval-pack repos that reach for
//! `async-trait` to define a transport seam ahead of a concrete backend.
//! Swapping in a real broker means implementing these two traits; nothing
//! else in `bus` needs to change.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::bus::error::{Error, Result};

/// Receives JSON-encoded messages published to a topic.
#[async_trait]
pub trait Consumer: Send + Sync {
  async fn recv(&mut self) -> Result<String>;
}

/// Publishes a JSON-encoded message, keyed by driver id the way the
/// original keys every response topic by `driverId`.
#[async_trait]
pub trait Producer: Send + Sync {
  async fn send(&self, driver_id: &str, payload: String) -> Result<()>;
}

/// In-process topic set for a single driver: one broadcast channel per
/// inbound request type, one mpsc channel collecting everything the driver
/// publishes. Useful for wiring a driver up without a real broker and for
/// exercising controllers in tests.
pub struct LocalBus {
  pub heartbeat_requests: broadcast::Sender<String>,
  pub command_requests: broadcast::Sender<String>,
  pub check_requests: broadcast::Sender<String>,
  pub start_requests: broadcast::Sender<String>,
  pub stop_requests: broadcast::Sender<String>,
  pub pause_requests: broadcast::Sender<String>,
  outbound_tx: mpsc::UnboundedSender<(String, String)>,
}

impl LocalBus {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, String)>) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let bus = LocalBus {
      heartbeat_requests: broadcast::channel(32).0,
      command_requests: broadcast::channel(32).0,
      check_requests: broadcast::channel(32).0,
      start_requests: broadcast::channel(32).0,
      stop_requests: broadcast::channel(32).0,
      pause_requests: broadcast::channel(32).0,
      outbound_tx,
    };
    (bus, outbound_rx)
  }

  pub fn producer(&self) -> LocalProducer {
    LocalProducer { outbound_tx: self.outbound_tx.clone() }
  }

  pub fn consumer(&self, which: &broadcast::Sender<String>) -> LocalConsumer {
    LocalConsumer { rx: which.subscribe() }
  }
}

pub struct LocalConsumer {
  rx: broadcast::Receiver<String>,
}

#[async_trait]
impl Consumer for LocalConsumer {
  async fn recv(&mut self) -> Result<String> {
    self.rx.recv().await.map_err(|_| Error::Closed)
  }
}

#[derive(Clone)]
pub struct LocalProducer {
  outbound_tx: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl Producer for LocalProducer {
  async fn send(&self, driver_id: &str, payload: String) -> Result<()> {
    self.outbound_tx.send((driver_id.to_string(), payload)).map_err(|e| Error::SendFailed(e.to_string()))
  }
}
