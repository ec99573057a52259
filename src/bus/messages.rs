//! Remote-bus JSON envelopes (spec §7 "Remote message bus").
//!
//! Field names, optionality and validity rules are grounded verbatim on
//! `original_source`'s `connector::models::*` DTOs. The status codes
//! (`IDL`/`RUN`/`PAU`/`CMP`/`ERR`/`UNK`/`HOM`/`PRI`/`FAI`) are the original's
//! three-letter codes, kept unchanged so a downstream consumer written
//! against the original bus keeps working unmodified.

use serde::{Deserialize, Serialize};

/// Broadcast heartbeat poll. Carries no payload; any body (including none)
/// is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
  #[serde(rename = "driverId")]
  pub driver_id: String,
  #[serde(rename = "statusCode")]
  pub status_code: String,
}

impl HeartbeatResponse {
  pub fn new(driver_id: impl Into<String>, status_code: impl Into<String>) -> Self {
    HeartbeatResponse { driver_id: driver_id.into(), status_code: status_code.into() }
  }

  pub fn is_valid(&self) -> bool {
    !self.driver_id.is_empty() && !self.status_code.is_empty()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterCommandRequest {
  #[serde(rename = "requestId")]
  pub request_id: String,
  #[serde(rename = "driverId")]
  pub driver_id: String,
  pub command: String,
  #[serde(default)]
  pub priority: i32,
}

impl PrinterCommandRequest {
  pub fn is_valid(&self) -> bool {
    !self.request_id.is_empty() && !self.driver_id.is_empty() && !self.command.is_empty()
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrinterCommandResponse {
  #[serde(rename = "driverId")]
  pub driver_id: String,
  #[serde(rename = "requestId")]
  pub request_id: String,
  pub ok: bool,
  #[serde(default)]
  pub exception: String,
  #[serde(default)]
  pub info: String,
}

impl PrinterCommandResponse {
  pub fn new(driver_id: impl Into<String>, request_id: impl Into<String>, ok: bool, exception: impl Into<String>, info: impl Into<String>) -> Self {
    PrinterCommandResponse {
      driver_id: driver_id.into(),
      request_id: request_id.into(),
      ok,
      exception: exception.into(),
      info: info.into(),
    }
  }

  pub fn is_valid(&self) -> bool {
    !self.driver_id.is_empty() && !self.request_id.is_empty()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterCheckRequest {
  #[serde(rename = "driverId")]
  pub driver_id: String,
  #[serde(rename = "jobId")]
  pub job_id: String,
  #[serde(default)]
  pub criteria: String,
}

impl PrinterCheckRequest {
  pub fn is_valid(&self) -> bool {
    !self.driver_id.is_empty() && !self.job_id.is_empty()
  }
}

/// All fields are strings, matching the original's `PrinterCheckResponseDto`
/// (it mirrors a Java counterpart that serializes everything as text).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrinterCheckResponse {
  #[serde(rename = "jobId")]
  pub job_id: String,
  #[serde(rename = "driverId")]
  pub driver_id: String,
  #[serde(rename = "jobStatusCode")]
  pub job_status_code: String,
  #[serde(rename = "printerStatusCode")]
  pub printer_status_code: String,

  #[serde(rename = "xPosition")]
  pub x_position: String,
  #[serde(rename = "yPosition")]
  pub y_position: String,
  #[serde(rename = "zPosition")]
  pub z_position: String,
  #[serde(rename = "ePosition")]
  pub e_position: String,

  pub feed: String,
  pub layer: String,
  #[serde(rename = "layerHeight")]
  pub layer_height: String,

  #[serde(rename = "extruderStatus")]
  pub extruder_status: String,
  #[serde(rename = "extruderTemp")]
  pub extruder_temp: String,

  #[serde(rename = "bedTemp")]
  pub bed_temp: String,

  #[serde(rename = "fanStatus")]
  pub fan_status: String,
  #[serde(rename = "fanSpeed")]
  pub fan_speed: String,

  #[serde(rename = "commandOffset")]
  pub command_offset: String,
  #[serde(rename = "lastCommand")]
  pub last_command: String,

  #[serde(rename = "averageSpeed")]
  pub average_speed: String,

  pub exceptions: String,
  pub logs: String,
}

impl PrinterCheckResponse {
  pub fn is_valid(&self) -> bool {
    !self.job_id.is_empty() && !self.driver_id.is_empty() && !self.job_status_code.is_empty() && !self.printer_status_code.is_empty()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterStartRequest {
  #[serde(rename = "driverId")]
  pub driver_id: String,
  #[serde(rename = "startGCode", default)]
  pub start_gcode: String,
  #[serde(rename = "endGCode", default)]
  pub end_gcode: String,
  #[serde(rename = "gcodeUrl", default)]
  pub gcode_url: String,
}

impl PrinterStartRequest {
  pub fn is_valid(&self) -> bool {
    !self.driver_id.is_empty() && (!self.gcode_url.is_empty() || !self.start_gcode.is_empty())
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterStopRequest {
  #[serde(rename = "driverId")]
  pub driver_id: String,
}

impl PrinterStopRequest {
  pub fn is_valid(&self) -> bool {
    !self.driver_id.is_empty()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterPauseRequest {
  #[serde(rename = "driverId")]
  pub driver_id: String,
}

impl PrinterPauseRequest {
  pub fn is_valid(&self) -> bool {
    !self.driver_id.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn printer_command_request_deserializes_camel_case_fields() {
    let json = r#"{"requestId":"r1","driverId":"d1","command":"M10 X1","priority":2}"#;
    let req: PrinterCommandRequest = serde_json::from_str(json).unwrap();
    assert_eq!(req.request_id, "r1");
    assert_eq!(req.priority, 2);
    assert!(req.is_valid());
  }

  #[test]
  fn printer_command_request_defaults_priority_when_absent() {
    let json = r#"{"requestId":"r1","driverId":"d1","command":"M10"}"#;
    let req: PrinterCommandRequest = serde_json::from_str(json).unwrap();
    assert_eq!(req.priority, 0);
  }

  #[test]
  fn printer_start_request_is_valid_with_either_url_or_inline_gcode() {
    let url_only = PrinterStartRequest { driver_id: "d1".into(), start_gcode: String::new(), end_gcode: String::new(), gcode_url: "http://x".into() };
    assert!(url_only.is_valid());
    let neither = PrinterStartRequest { driver_id: "d1".into(), start_gcode: String::new(), end_gcode: String::new(), gcode_url: String::new() };
    assert!(!neither.is_valid());
  }

  #[test]
  fn printer_check_response_serializes_with_camel_case_keys() {
    let response = PrinterCheckResponse {
      job_id: "job-1".into(),
      driver_id: "d1".into(),
      job_status_code: "RUN".into(),
      printer_status_code: "PRI".into(),
      ..Default::default()
    };
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"jobId\":\"job-1\""));
    assert!(json.contains("\"printerStatusCode\":\"PRI\""));
  }
}
