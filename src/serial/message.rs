//! Inbound serial message classification and parsing (spec §3 "Serial
//! message", §4.1 "Inbound classification", §6 "Serial wire protocol
//! (inbound lines)").

use crate::command::checksum;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Kind {
  Standard,
  Informational,
  Critical,
}

/// The decoded meaning of a STANDARD message's leading token(s).
#[derive(Debug, Clone, PartialEq)]
pub enum StandardCode {
  /// `OK<d> N<m>` / `OK N<m>` / `OK <m>` (malformed, tolerated with a warning)
  Ok { n: Option<u16>, malformed: bool },
  /// `RESEND N<m>`
  Resend { n: u16 },
  /// `RESEND FAILED N<m>`
  ResendFailed { n: u16 },
  /// `DUPLICATE N<m>` / `DUPLICATE <m>` / bare `DUPLICATE`
  Duplicate { n: Option<u16> },
  /// `ERR...`
  Err,
  /// `BUSY`
  Busy,
  /// Anything else classified STANDARD by the code-pattern but not
  /// recognized above (kept for forward compatibility with firmware
  /// variants; treated like an informational line by the caller).
  Other,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialMessage {
  pub kind: Kind,
  pub standard: Option<StandardCode>,
  pub payload: String,
  pub rx_checksum: Option<u8>,
  pub calc_checksum: u8,
  pub valid: bool,
  pub raw: String,
}

/// Splits `raw` into the payload (everything before ` *`) and the optional
/// trailing checksum.
fn split_checksum(raw: &str) -> (&str, Option<u8>) {
  match raw.rfind(" *") {
    Some(pos) => {
      let payload = raw[..pos].trim_end();
      let cs_str = raw[pos + 2..].trim();
      let cs = cs_str.parse::<u8>().ok();
      (payload, cs)
    }
    None => (raw.trim(), None),
  }
}

fn parse_n(token: &str) -> Option<u16> {
  token.strip_prefix('N').and_then(|s| s.parse::<u16>().ok())
}

/// Classifies and parses one raw inbound line.
pub fn parse(raw: &str) -> SerialMessage {
  let raw = raw.trim_end_matches(['\r', '\n']).to_string();
  let (payload, rx_checksum) = split_checksum(&raw);
  let payload = payload.to_string();
  let calc_checksum = checksum(payload.as_bytes());
  let valid = match rx_checksum {
    Some(rx) => rx == calc_checksum,
    None => true, // messages without a checksum trailer are not checked
  };

  if payload.starts_with("CRT") {
    return SerialMessage {
      kind: Kind::Critical,
      standard: None,
      payload,
      rx_checksum,
      calc_checksum,
      valid,
      raw,
    };
  }

  let mut tokens = payload.split_whitespace();
  let first = tokens.next().unwrap_or("");

  let standard_code = if first == "BUSY" {
    Some(StandardCode::Busy)
  } else if first.starts_with("ERR") {
    Some(StandardCode::Err)
  } else if first == "RESEND" {
    match tokens.next() {
      Some("FAILED") => tokens.next().and_then(parse_n).map(|n| StandardCode::ResendFailed { n }),
      Some(tok) => parse_n(tok).map(|n| StandardCode::Resend { n }),
      None => None,
    }
  } else if first == "DUPLICATE" {
    let n = tokens.next().and_then(|tok| parse_n(tok).or_else(|| tok.parse::<u16>().ok()));
    Some(StandardCode::Duplicate { n })
  } else if first.starts_with("OK") {
    let tok = tokens.next();
    match tok {
      Some(t) => match parse_n(t) {
        Some(n) => Some(StandardCode::Ok { n: Some(n), malformed: false }),
        None => match t.parse::<u16>() {
          // "OK <m>" / "OK0 16" without the N prefix: tolerated with a
          // warning by the caller (spec §9 open question).
          Ok(n) => Some(StandardCode::Ok { n: Some(n), malformed: true }),
          Err(_) => Some(StandardCode::Ok { n: None, malformed: true }),
        },
      },
      None => Some(StandardCode::Ok { n: None, malformed: true }),
    }
  } else {
    None
  };

  let kind = if standard_code.is_some() { Kind::Standard } else { Kind::Informational };

  SerialMessage {
    kind,
    standard: standard_code,
    payload,
    rx_checksum,
    calc_checksum,
    valid,
    raw,
  }
}

/// Formats the `A<ccc>` acknowledgement line for a message whose payload
/// checksum was computed as `calc_checksum`.
pub fn format_ack(calc_checksum: u8) -> String {
  format!("A{:03}", calc_checksum)
}
