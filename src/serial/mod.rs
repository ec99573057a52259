//! Synchronous serial protocol engine (spec §4.1 "Serial Protocol Engine").
//!
//! Splits, like the teacher crate, into a dedicated reader thread feeding a
//! channel and a single mutex-guarded writer side. The engine on top of
//! that is the only thing allowed to hold the mutex across a whole
//! request/response exchange.

pub mod engine;
pub mod error;
pub mod history;
pub mod message;
pub mod port;

pub use engine::{EngineConfig, ProtocolEngine, SendOutcome};
pub use error::{Error, Result};
pub use history::CommandHistory;
