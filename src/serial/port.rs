//! Owns the physical serial connection: opens it, and spawns the reader
//! thread that turns an unbounded byte stream into discrete lines handed to
//! the protocol engine over a channel.
//!
//! Mirrors the teacher crate's split of a dedicated `read_thread` /
//! `write_thread` pair talking over `std::sync::mpsc`, adapted from binary
//! packet framing to newline-delimited text framing.

use std::io::{BufRead, BufReader, Write};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serialport::SerialPort as SerialPortTrait;

use super::error::{Error, Result};

/// Opens the serial device at `path` at `baud_rate`, returning a read half
/// and a write half (via `try_clone`, as the teacher crate does).
pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<(Box<dyn SerialPortTrait>, Box<dyn SerialPortTrait>)> {
  let read_port = serialport::new(path, baud_rate)
    .timeout(timeout)
    .open()
    .map_err(Error::SerialPortError)?;

  let write_port = read_port.try_clone().map_err(Error::SerialPortError)?;

  Ok((read_port, write_port))
}

/// Spawns a thread that reads newline-delimited text from `port` and
/// forwards each line (sans terminator) to `line_tx`. Exits (dropping the
/// sender) when the port errors out or is closed.
pub fn spawn_reader_thread(port: Box<dyn SerialPortTrait>, line_tx: Sender<String>) -> JoinHandle<()> {
  thread::spawn(move || {
    debug!("started serial reader thread");

    let mut reader = BufReader::new(port);
    let mut buf = String::new();

    loop {
      buf.clear();
      match reader.read_line(&mut buf) {
        Ok(0) => {
          debug!("serial port reached EOF, reader thread exiting");
          break;
        }
        Ok(_) => {
          let line = buf.trim_end_matches(['\r', '\n']);
          if !line.is_empty() {
            if line_tx.send(line.to_string()).is_err() {
              break;
            }
          }
        }
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
        Err(e) => {
          warn!("serial read error, reader thread exiting: {}", e);
          break;
        }
      }
    }
  })
}

/// Writes one already-terminated line of bytes to the serial port.
pub fn write_line(port: &mut dyn SerialPortTrait, line: &str) -> Result<()> {
  port.write_all(line.as_bytes()).map_err(Error::WriteError)?;
  port.write_all(b"\n").map_err(Error::WriteError)?;
  port.flush().map_err(Error::WriteError)
}
