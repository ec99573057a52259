//! Printer driver core (spec §1): bridges a remote message bus to a
//! serial-connected printer's firmware, translating G-code into the
//! firmware's own `N<category><code> ...params... *<checksum>` wire
//! protocol and tracking job and printer state along the way.
//!
//! Module layout mirrors the pipeline a command takes: `bus` receives it
//! from the remote side, `queue` holds it, `executor` drains the queue,
//! `translator` turns G-code into a category/code/param triple, `driver`
//! turns that into a wire exchange via `serial`, and `state`/`job` track
//! what happened.

#[macro_use]
extern crate log;

pub mod bus;
pub mod command;
pub mod config;
pub mod driver;
pub mod executor;
pub mod job;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod serial;
pub mod state;
pub mod translator;

pub use config::Config;
pub use driver::Driver;
pub use state::StateTracker;
