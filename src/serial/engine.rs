//! Synchronous request/response protocol engine (spec §4.1).
//!
//! The engine owns the serial channel exclusively behind a single mutex and
//! exposes exactly one operation: `send_and_await`. It is generic over the
//! byte sink (`Box<dyn Write + Send>`) so the same state machine drives both
//! a real `serialport` handle and, in tests, an in-memory double that
//! records what was written.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::error::{Error, Result};
use super::history::CommandHistory;
use super::message::{self, Kind, SerialMessage, StandardCode};

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub max_attempts: u32,
  pub attempt_timeout: Duration,
  pub busy_sleep: Duration,
  pub critical_timeout: Duration,
  pub poll_interval: Duration,
  pub ready_banner_markers: Vec<String>,
  pub reset_banner_markers: Vec<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      max_attempts: 5,
      attempt_timeout: Duration::from_millis(5000),
      busy_sleep: Duration::from_millis(100),
      critical_timeout: Duration::from_millis(5000),
      poll_interval: Duration::from_millis(100),
      ready_banner_markers: vec!["system ready".into()],
      reset_banner_markers: vec!["reset".into()],
    }
  }
}

/// Outcome of one `send_and_await` exchange, per spec §4.1.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
  Success { message: String, body: Vec<String> },
  ResendFailed(String),
  Error(String),
}

struct EngineState {
  writer: Box<dyn Write + Send>,
  line_rx: Receiver<String>,
  history: CommandHistory,
}

pub struct ProtocolEngine {
  state: Mutex<EngineState>,
  ready: AtomicBool,
  next_number: AtomicU16,
  cfg: EngineConfig,
}

impl ProtocolEngine {
  pub fn new(writer: Box<dyn Write + Send>, line_rx: Receiver<String>, cfg: EngineConfig) -> Self {
    ProtocolEngine {
      state: Mutex::new(EngineState { writer, line_rx, history: CommandHistory::new() }),
      ready: AtomicBool::new(false),
      next_number: AtomicU16::new(1),
      cfg,
    }
  }

  pub fn is_ready(&self) -> bool {
    self.ready.load(Ordering::SeqCst)
  }

  /// Allocates the next command number (spec §3 "Command number N").
  pub fn next_number(&self) -> u16 {
    self.next_number.fetch_add(1, Ordering::SeqCst)
  }

  pub fn history_len(&self) -> usize {
    self.state.lock().unwrap().history.len()
  }

  fn is_ready_banner(&self, line: &str) -> bool {
    let lower = line.to_lowercase();
    self.cfg.ready_banner_markers.iter().any(|m| lower.contains(&m.to_lowercase()))
  }

  fn is_reset_banner(&self, line: &str) -> bool {
    let lower = line.to_lowercase();
    self.cfg.reset_banner_markers.iter().any(|m| lower.contains(&m.to_lowercase()))
  }

  /// Blocks reading lines (no sends permitted) until a ready banner is
  /// seen, or `timeout` elapses.
  pub fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
    let state = self.state.lock().unwrap();
    self.wait_for_ready_locked(state, timeout)
  }

  fn wait_for_ready_locked(&self, mut state: std::sync::MutexGuard<'_, EngineState>, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
      let remaining = deadline.saturating_duration_since(Instant::now());
      let wait = remaining.min(self.cfg.poll_interval);
      match state.line_rx.recv_timeout(wait) {
        Ok(line) => {
          if self.is_ready_banner(&line) {
            self.ready.store(true, Ordering::SeqCst);
            info!("firmware ready: {}", line);
            return Ok(());
          }
          debug!("ignoring pre-ready line: {}", line);
        }
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => return Err(Error::ChannelDisconnected),
      }
    }
    Err(Error::NotReady)
  }

  fn write_line(&self, writer: &mut dyn Write, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).map_err(Error::WriteError)?;
    writer.write_all(b"\n").map_err(Error::WriteError)?;
    writer.flush().map_err(Error::WriteError)
  }

  /// Replays the stored text for `n` from history, if present. Returns
  /// whether it was found (and therefore resent).
  fn replay_resend(&self, state: &mut EngineState, n: u16) -> Result<bool> {
    match state.history.get(n).map(|s| s.to_string()) {
      Some(text) => {
        warn!("resending N{}: {}", n, text);
        self.write_line(&mut state.writer, &text)?;
        Ok(true)
      }
      None => {
        error!("cannot RESEND N{} - not in history", n);
        Ok(false)
      }
    }
  }

  /// Blocks waiting for a valid retransmission of a critical message whose
  /// first copy failed checksum validation (spec §4.1 "Checksum policy").
  fn await_valid_critical(&self, state: &mut EngineState) -> Result<Option<SerialMessage>> {
    let deadline = Instant::now() + self.cfg.critical_timeout;
    while Instant::now() < deadline {
      let remaining = deadline.saturating_duration_since(Instant::now());
      let wait = remaining.min(self.cfg.poll_interval);
      match state.line_rx.recv_timeout(wait) {
        Ok(line) => {
          let msg = message::parse(&line);
          self.write_line(&mut state.writer, &message::format_ack(msg.calc_checksum))?;
          if msg.valid {
            return Ok(Some(msg));
          }
          warn!("retransmission still checksum-invalid, continuing to wait: {}", msg.raw);
        }
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => return Err(Error::ChannelDisconnected),
      }
    }
    Ok(None)
  }

  /// Sends `rendered_text` (already numbered `number`) and blocks until the
  /// firmware acknowledges it, per the state machine in spec §4.1.
  pub fn send_and_await(&self, number: u16, rendered_text: &str) -> Result<SendOutcome> {
    if !self.is_ready() {
      return Err(Error::NotReady);
    }

    let mut state = self.state.lock().unwrap();

    state.history.store(number, rendered_text);
    self.write_line(&mut state.writer, rendered_text)?;
    info!("sent N{}: {}", number, rendered_text);

    let mut resend_queue: VecDeque<u16> = VecDeque::new();
    let mut body: Vec<String> = Vec::new();

    for attempt in 1..=self.cfg.max_attempts {
      let mut deadline = Instant::now() + self.cfg.attempt_timeout;

      loop {
        if Instant::now() >= deadline {
          break;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = remaining.min(self.cfg.poll_interval);
        let line = match state.line_rx.recv_timeout(wait) {
          Ok(line) => line,
          Err(RecvTimeoutError::Timeout) => continue,
          Err(RecvTimeoutError::Disconnected) => return Err(Error::ChannelDisconnected),
        };

        if self.is_reset_banner(&line) {
          warn!("firmware reset banner seen mid-session: {}", line);
          self.ready.store(false, Ordering::SeqCst);
          return Err(Error::NotReady);
        }

        let msg = message::parse(&line);
        self.write_line(&mut state.writer, &message::format_ack(msg.calc_checksum))?;

        match msg.kind {
          Kind::Critical => {
            let critical = if msg.valid {
              msg
            } else {
              warn!("critical message checksum invalid, blocking for retry: {}", line);
              match self.await_valid_critical(&mut state)? {
                Some(valid) => valid,
                None => {
                  return Err(Error::CriticalProcessingError(
                    "timeout waiting for valid critical retransmission".into(),
                  ))
                }
              }
            };
            warn!("critical message: {}", critical.payload);
            continue;
          }

          Kind::Informational => {
            if msg.valid {
              body.push(msg.payload.clone());
            } else {
              warn!("dropping informational message with bad checksum: {}", msg.raw);
            }
            continue;
          }

          Kind::Standard => {
            if !msg.valid {
              warn!("dropping standard message with bad checksum: {}", msg.raw);
              continue;
            }

            match msg.standard.clone().unwrap_or(StandardCode::Other) {
              StandardCode::Busy => {
                deadline = Instant::now() + self.cfg.attempt_timeout;
                std::thread::sleep(self.cfg.busy_sleep);
                continue;
              }

              StandardCode::Ok { n: Some(n), malformed } => {
                if malformed {
                  warn!("received malformed OK without 'N' prefix for N{}", n);
                }

                if let Some(&front) = resend_queue.front() {
                  if front == n {
                    info!("RESEND completed for N{}", n);
                    resend_queue.pop_front();
                    if let Some(&next_resend) = resend_queue.front() {
                      self.replay_resend(&mut state, next_resend)?;
                    }
                    continue;
                  }
                }

                if n == number {
                  return Ok(SendOutcome::Success { message: "Command acknowledged".into(), body });
                }

                warn!("ACK mismatch - expected N{} but got N{}", number, n);
                continue;
              }

              StandardCode::Ok { n: None, .. } => {
                error!("cannot parse OK response: {}", msg.raw);
                continue;
              }

              StandardCode::ResendFailed { n } => {
                return Ok(SendOutcome::ResendFailed(format!("RESEND FAILED - continuing from N{}", n)));
              }

              StandardCode::Resend { n } => {
                if !resend_queue.contains(&n) {
                  resend_queue.push_back(n);
                }
                if self.replay_resend(&mut state, n)? {
                  continue;
                }
                return Ok(SendOutcome::Success {
                  message: format!("RESEND failed - N{} not in history", n),
                  body,
                });
              }

              StandardCode::Duplicate { n } => {
                let dup = n.unwrap_or(number);
                info!("DUPLICATE for N{}", dup);
                if dup == number {
                  return Ok(SendOutcome::Success {
                    message: "Command already processed (DUPLICATE)".into(),
                    body,
                  });
                }
                continue;
              }

              StandardCode::Err => {
                error!("ERROR response: {}", msg.raw);
                return Ok(SendOutcome::Error(msg.raw.clone()));
              }

              StandardCode::Other => continue,
            }
          }
        }
      }

      warn!("timeout for N{} (attempt {}/{})", number, attempt, self.cfg.max_attempts);
      if attempt < self.cfg.max_attempts {
        match state.history.get(number).map(|s| s.to_string()) {
          Some(text) => {
            info!("retrying N{}", number);
            self.write_line(&mut state.writer, &text)?;
          }
          None => {
            error!("cannot retry N{} - not in history", number);
            break;
          }
        }
      }
    }

    error!("max retries exceeded for N{}", number);
    Err(Error::MaxRetriesExceeded(number))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc::channel;
  use std::sync::{Arc, Mutex as StdMutex};

  struct RecordingWriter {
    lines: Arc<StdMutex<Vec<String>>>,
  }

  impl Write for RecordingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      let text = String::from_utf8_lossy(buf).to_string();
      let mut lines = self.lines.lock().unwrap();
      if text == "\n" {
        // newline terminator write, ignore
      } else {
        lines.push(text);
      }
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  fn make_engine() -> (ProtocolEngine, Arc<StdMutex<Vec<String>>>, std::sync::mpsc::Sender<String>) {
    let lines = Arc::new(StdMutex::new(Vec::new()));
    let (tx, rx) = channel();
    let writer = Box::new(RecordingWriter { lines: lines.clone() });
    let mut cfg = EngineConfig::default();
    cfg.attempt_timeout = Duration::from_millis(300);
    cfg.poll_interval = Duration::from_millis(20);
    cfg.critical_timeout = Duration::from_millis(500);
    let engine = ProtocolEngine::new(writer, rx, cfg);
    engine.ready.store(true, Ordering::SeqCst);
    (engine, lines, tx)
  }

  #[test]
  fn happy_path_ok() {
    let (engine, sent, tx) = make_engine();
    tx.send("OK0 N7 *5".to_string()).unwrap();

    let outcome = engine.send_and_await(7, "N7 M10 X10 Y20 Z0 F1000 *1").unwrap();
    assert_eq!(
      outcome,
      SendOutcome::Success { message: "Command acknowledged".into(), body: vec![] }
    );
    assert!(sent.lock().unwrap().iter().any(|l| l.starts_with("N7 M10")));
  }

  #[test]
  fn resend_recovery() {
    let (engine, sent, tx) = make_engine();
    tx.send("RESEND N9".to_string()).unwrap();
    tx.send("OK0 N9 *2".to_string()).unwrap();

    let outcome = engine.send_and_await(9, "N9 T10 S200 *1").unwrap();
    assert!(matches!(outcome, SendOutcome::Success { .. }));

    let sent_lines = sent.lock().unwrap();
    let resend_count = sent_lines.iter().filter(|l| l.starts_with("N9 T10")).count();
    assert_eq!(resend_count, 2, "original send plus one resend");
  }

  #[test]
  fn duplicate_swallow() {
    let (engine, _sent, tx) = make_engine();
    tx.send("DUPLICATE 11".to_string()).unwrap();

    let outcome = engine.send_and_await(11, "N11 S0 *1").unwrap();
    assert_eq!(
      outcome,
      SendOutcome::Success { message: "Command already processed (DUPLICATE)".into(), body: vec![] }
    );
  }

  #[test]
  fn resend_failed_treated_as_success() {
    let (engine, _sent, tx) = make_engine();
    tx.send("RESEND FAILED N12".to_string()).unwrap();

    let outcome = engine.send_and_await(12, "N12 M10 X1 *1").unwrap();
    match outcome {
      SendOutcome::ResendFailed(msg) => assert!(msg.contains("N12")),
      other => panic!("expected ResendFailed, got {:?}", other),
    }
  }

  #[test]
  fn critical_bad_checksum_then_good() {
    let (engine, _sent, tx) = make_engine();
    tx.send("CRT TMP 220.0 200.0 *0".to_string()).unwrap();

    let tx2 = tx.clone();
    std::thread::spawn(move || {
      std::thread::sleep(Duration::from_millis(80));
      tx2.send("CRT TMP 220.0 200.0 *89".to_string()).unwrap();
      tx2.send("OK0 N20 *3".to_string()).unwrap();
    });

    let outcome = engine.send_and_await(20, "N20 M10 X0 *1").unwrap();
    assert!(matches!(outcome, SendOutcome::Success { .. }));
  }

  #[test]
  fn timeout_exhausts_retries() {
    let (engine, sent, _tx) = make_engine();
    let result = engine.send_and_await(3, "N3 M0 *9");
    assert!(matches!(result, Err(Error::MaxRetriesExceeded(3))));

    let sent_lines = sent.lock().unwrap();
    assert_eq!(sent_lines.iter().filter(|l| l.starts_with("N3 M0")).count(), 5);
  }

  #[test]
  fn not_ready_rejects_send() {
    let (engine, _sent, _tx) = make_engine();
    engine.ready.store(false, Ordering::SeqCst);
    let result = engine.send_and_await(1, "N1 S0 *1");
    assert!(matches!(result, Err(Error::NotReady)));
  }

  #[test]
  fn wait_for_ready_detects_banner() {
    let (tx, rx) = channel();
    let lines = Arc::new(StdMutex::new(Vec::new()));
    let writer = Box::new(RecordingWriter { lines: lines.clone() });
    let engine = ProtocolEngine::new(writer, rx, EngineConfig::default());
    assert!(!engine.is_ready());

    tx.send("garbage".to_string()).unwrap();
    tx.send("System ready.".to_string()).unwrap();
    engine.wait_for_ready(Duration::from_millis(500)).unwrap();
    assert!(engine.is_ready());
  }
}
