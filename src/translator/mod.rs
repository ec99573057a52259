//! G-code translator and dispatcher chain (spec §4.3).
//!
//! Strips comments and blank lines, tokenises the opcode and its unordered
//! `{letter -> f64}` parameters, then offers the tuple to a registered chain
//! of dispatchers. The first dispatcher whose `can_handle` matches is asked
//! to `validate` then `handle`; everything else raises `UnknownOpcode`.

pub mod endstop;
pub mod error;
pub mod extruder;
pub mod facade;
pub mod fan;
pub mod history;
pub mod motion;
pub mod system;
pub mod temperature;

use std::collections::HashMap;
use std::sync::Arc;

pub use error::{Error, Result};
pub use facade::{CommandResponse, Driver};

/// One tokenised input line: an opcode (`G1`, `M106`, ...) and its unordered
/// parameter map, keyed by the upper-cased letter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
  pub opcode: String,
  pub params: HashMap<char, f64>,
}

/// Strips `;` and `%` line comments and surrounding whitespace.
fn strip_comment(line: &str) -> &str {
  let line = match line.find(';') {
    Some(pos) => &line[..pos],
    None => line,
  };
  let line = match line.find('%') {
    Some(pos) => &line[..pos],
    None => line,
  };
  line.trim()
}

/// Tokenises one already-stripped line into an opcode and parameter map.
pub fn parse_gcode_line(line: &str) -> Option<ParsedLine> {
  let mut tokens = line.split_whitespace();
  let opcode = tokens.next()?.to_uppercase();

  let mut params = HashMap::new();
  for token in tokens {
    if token.len() < 2 {
      continue;
    }
    let mut chars = token.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let rest: String = chars.collect();
    if let Ok(value) = rest.parse::<f64>() {
      params.insert(letter, value);
    }
  }

  Some(ParsedLine { opcode, params })
}

/// A category dispatcher, modeled on the original `ICommandDispatcher`
/// chain-of-responsibility: `can_handle` -> `validate` -> `handle`.
pub trait Dispatcher: Send + Sync {
  fn can_handle(&self, opcode: &str) -> bool;
  fn validate(&self, opcode: &str, params: &HashMap<char, f64>) -> bool;
  fn handle(&self, opcode: &str, params: &HashMap<char, f64>) -> Result<()>;
}

pub struct GCodeTranslator {
  dispatchers: Vec<Box<dyn Dispatcher>>,
}

impl GCodeTranslator {
  pub fn new() -> Self {
    GCodeTranslator { dispatchers: Vec::new() }
  }

  /// Builds a translator with the full stock dispatcher set (spec §4.3),
  /// sharing one driver facade across all of them.
  pub fn with_default_dispatchers(driver: Arc<dyn Driver>) -> Self {
    let mut translator = GCodeTranslator::new();
    translator.register_dispatcher(Box::new(motion::MotionDispatcher::new(driver.clone())));
    translator.register_dispatcher(Box::new(extruder::ExtruderDispatcher::new(driver.clone())));
    translator.register_dispatcher(Box::new(fan::FanDispatcher::new(driver.clone())));
    translator.register_dispatcher(Box::new(temperature::TemperatureDispatcher::new(driver.clone())));
    translator.register_dispatcher(Box::new(system::SystemDispatcher::new(driver.clone())));
    translator.register_dispatcher(Box::new(endstop::EndstopDispatcher::new(driver.clone())));
    translator.register_dispatcher(Box::new(history::HistoryDispatcher::new(driver)));
    translator
  }

  pub fn register_dispatcher(&mut self, dispatcher: Box<dyn Dispatcher>) {
    self.dispatchers.push(dispatcher);
  }

  /// Parses and dispatches every non-blank, non-comment line.
  pub fn parse_lines(&self, lines: &[String]) -> Vec<Result<()>> {
    lines.iter().filter_map(|line| self.parse_line(line)).collect()
  }

  /// Parses and dispatches one line. Returns `None` for blank/comment-only
  /// lines (nothing to report), `Some(Err(..))` for unknown/invalid
  /// opcodes or driver failures.
  pub fn parse_line(&self, line: &str) -> Option<Result<()>> {
    let stripped = strip_comment(line);
    if stripped.is_empty() {
      return None;
    }

    let parsed = parse_gcode_line(stripped)?;
    debug!("translator parsing: {}", stripped);
    Some(self.dispatch(&parsed.opcode, &parsed.params))
  }

  fn dispatch(&self, opcode: &str, params: &HashMap<char, f64>) -> Result<()> {
    for dispatcher in &self.dispatchers {
      if dispatcher.can_handle(opcode) {
        if dispatcher.validate(opcode, params) {
          return dispatcher.handle(opcode, params);
        }
        warn!("invalid opcode: {}", opcode);
        return Err(Error::InvalidOpcode(opcode.to_string()));
      }
    }

    warn!("unhandled opcode: {}", opcode);
    Err(Error::UnknownOpcode(opcode.to_string()))
  }
}

impl Default for GCodeTranslator {
  fn default() -> Self {
    GCodeTranslator::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_comments_and_blank_lines() {
    assert_eq!(strip_comment("G1 X10 ; move forward"), "G1 X10");
    assert_eq!(strip_comment("% full percent comment"), "");
    assert_eq!(strip_comment("   "), "");
  }

  #[test]
  fn tokenises_opcode_and_params() {
    let parsed = parse_gcode_line("g1 X10.5 y-2 F1000").unwrap();
    assert_eq!(parsed.opcode, "G1");
    assert_eq!(parsed.params.get(&'X'), Some(&10.5));
    assert_eq!(parsed.params.get(&'Y'), Some(&-2.0));
    assert_eq!(parsed.params.get(&'F'), Some(&1000.0));
  }

  #[test]
  fn unknown_opcode_is_reported() {
    let translator = GCodeTranslator::new();
    let outcome = translator.parse_line("G1234 X1");
    assert!(matches!(outcome, Some(Err(Error::UnknownOpcode(_)))));
  }
}
