//! Command numbers, categories, and the single wire-rendering routine used
//! by every translator dispatcher.

use std::fmt;

/// Command category letter, assigned by the dispatcher that recognizes a
/// given G-code opcode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Category {
  /// Motion (`M10` linear move, `M0` emergency stop, `M99` diagnose, ...)
  Motion,
  /// Extruder (`A10` extrude, `A20` retract)
  Extruder,
  /// Temperature (`T10`/`T20` set target, `T11`/`T21` read actual)
  Temperature,
  /// Fan (`F10` set speed, `F0` off)
  Fan,
  /// System (`S0` home, start/pause/resume/status/reset)
  System,
  /// Endstop (`E10` dump status)
  Endstop,
  /// History (`H...` clear firmware command history)
  History,
}

impl Category {
  fn as_letter(&self) -> char {
    match self {
      Category::Motion => 'M',
      Category::Extruder => 'A',
      Category::Temperature => 'T',
      Category::Fan => 'F',
      Category::System => 'S',
      Category::Endstop => 'E',
      Category::History => 'H',
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_letter())
  }
}

/// A single named parameter (`X10.5`, `S200`, ...) attached to an outbound
/// command.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub letter: char,
  pub value: String,
}

impl Param {
  pub fn new(letter: char, value: impl Into<String>) -> Self {
    Param { letter, value: value.into() }
  }

  /// Builds a parameter from a float using the crate's one formatter.
  ///
  /// The source this is modeled on had two float formatters in play
  /// (motion commands used the default textual float representation,
  /// everything else used a trimmed-decimals formatter); this crate picks
  /// the trimmed-decimals formatter everywhere so rendered text is
  /// consistent regardless of which dispatcher produced it.
  pub fn from_f64(letter: char, value: f64) -> Self {
    Param::new(letter, format_f64(value))
  }
}

impl fmt::Display for Param {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.letter, self.value)
  }
}

/// Formats a float with up to 4 decimal places, trimming trailing zeros and
/// a trailing decimal point.
pub fn format_f64(value: f64) -> String {
  let mut s = format!("{:.4}", value);
  if s.contains('.') {
    while s.ends_with('0') {
      s.pop();
    }
    if s.ends_with('.') {
      s.pop();
    }
  }
  s
}

/// A fully assembled command, ready to be rendered and sent to the
/// protocol engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
  pub number: u16,
  pub category: Category,
  pub code: u32,
  pub params: Vec<Param>,
  pub rendered_text: String,
}

impl CommandRecord {
  /// Builds and renders a command record for command number `number`.
  ///
  /// Rendered form: `"N<n> <cat><code> <param>... *<checksum>"` where the
  /// checksum is the XOR of all bytes of the string preceding `" *"`.
  pub fn new(number: u16, category: Category, code: u32, params: Vec<Param>) -> Self {
    let mut body = format!("N{} {}{}", number, category, code);
    for param in &params {
      body.push(' ');
      body.push_str(&param.to_string());
    }

    let checksum = checksum(body.as_bytes());
    let rendered_text = format!("{} *{}", body, checksum);

    CommandRecord {
      number,
      category,
      code,
      params,
      rendered_text,
    }
  }
}

/// Computes the bytewise XOR checksum of `bytes`, used both for outbound
/// command framing and inbound message validation.
pub fn checksum(bytes: &[u8]) -> u8 {
  bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_motion_command_with_checksum() {
    let cmd = CommandRecord::new(
      7,
      Category::Motion,
      10,
      vec![
        Param::from_f64('X', 10.0),
        Param::from_f64('Y', 20.0),
        Param::from_f64('Z', 0.0),
        Param::from_f64('F', 1000.0),
      ],
    );

    assert!(cmd.rendered_text.starts_with("N7 M10 X10 Y20 Z0 F1000 *"));

    let (body, cs) = cmd.rendered_text.rsplit_once(" *").unwrap();
    let expected: u8 = cs.parse().unwrap();
    assert_eq!(checksum(body.as_bytes()), expected);
  }

  #[test]
  fn format_f64_trims_trailing_zeros() {
    assert_eq!(format_f64(10.0), "10");
    assert_eq!(format_f64(10.5), "10.5");
    assert_eq!(format_f64(0.125), "0.125");
    assert_eq!(format_f64(-3.0), "-3");
  }

  #[test]
  fn checksum_roundtrip_for_all_rendered_text() {
    for n in [0u16, 1, 65535] {
      let cmd = CommandRecord::new(n, Category::Temperature, 10, vec![Param::from_f64('S', 200.0)]);
      let (body, cs) = cmd.rendered_text.rsplit_once(" *").unwrap();
      let rx: u8 = cs.parse().unwrap();
      assert_eq!(checksum(body.as_bytes()), rx);
    }
  }
}
