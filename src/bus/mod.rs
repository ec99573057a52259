//! Remote message bus (spec §7): the connector-facing half of the driver.
//! Six topics -- heartbeat, printer-command, printer-check, and the three
//! printer-control requests (start/stop/pause) -- each with its own
//! controller, all filtering on `driverId` since every topic in the
//! original is shared across every driver connected to the broker.
//!
//! Grounded on `original_source`'s `connector::processors::*` and the
//! models they consume, adapted onto a transport-agnostic seam
//! (`transport::Consumer`/`Producer`) since a real broker client is out of
//! scope here (spec §1's non-goals).

pub mod check;
pub mod command;
pub mod control;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod status;
pub mod transport;

pub use error::{Error, Result};
