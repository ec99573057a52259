//! Maps `job::JobState` onto the three-letter status codes the original
//! bus's heartbeat and printer-check responses use. The original tracked a
//! separate `PrintState` (driver-level) and job status (queue-level); this
//! crate's `JobState` already folds both into one state machine, so each
//! caller picks the code family it needs from the same enum.

use crate::job::JobState;

/// `HeartbeatResponse::statusCode`, grounded on `HeartbeatProcessor::getDriverStatusCode`.
pub fn heartbeat_code(state: JobState) -> &'static str {
  match state {
    JobState::Idle => "IDL",
    JobState::Printing => "RUN",
    JobState::Paused => "PAU",
    JobState::Completed => "CMP",
    JobState::Error => "ERR",
    _ => "UNK",
  }
}

/// `PrinterCheckResponse::printerStatusCode`, grounded on
/// `PrinterCheckProcessor::getPrinterStatusCode`.
pub fn printer_status_code(state: JobState) -> &'static str {
  match state {
    JobState::Idle => "IDL",
    JobState::PreCheck | JobState::Loading => "HOM",
    JobState::Printing | JobState::Heating | JobState::Ready | JobState::Finishing => "PRI",
    JobState::Paused => "PAU",
    JobState::Error => "ERR",
    _ => "UNK",
  }
}

/// `PrinterCheckResponse::jobStatusCode`, grounded on
/// `PrinterCheckProcessor::getJobStatusCode`.
pub fn job_status_code(state: JobState, queue_size: usize) -> &'static str {
  match state {
    JobState::Error => "FAI",
    JobState::Paused => "PAU",
    JobState::Printing if queue_size > 0 => "RUN",
    JobState::Printing => "CMP",
    JobState::Completed => "CMP",
    JobState::Cancelled => "FAI",
    _ => "UNK",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn heartbeat_code_covers_the_common_states() {
    assert_eq!(heartbeat_code(JobState::Idle), "IDL");
    assert_eq!(heartbeat_code(JobState::Printing), "RUN");
    assert_eq!(heartbeat_code(JobState::Error), "ERR");
  }

  #[test]
  fn job_status_code_distinguishes_running_from_drained() {
    assert_eq!(job_status_code(JobState::Printing, 5), "RUN");
    assert_eq!(job_status_code(JobState::Printing, 0), "CMP");
  }
}
