//! File-backed cold tier of the priority queue (spec §4.4 "Disk record
//! format"). Mirrors `original_source`'s dual-write design: every record
//! paged to disk is appended to the durability file *and* kept in an
//! in-memory FIFO, so the processing loop's reads never block on file I/O.
//! The file is an append-only log, removed on clean shutdown.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use bytes::{Buf, BufMut, BytesMut};

use super::PriorityCommand;

pub struct DiskSegment {
  file: Option<File>,
  path: PathBuf,
  records: VecDeque<PriorityCommand>,
}

impl DiskSegment {
  pub fn open(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    if let Some(parent) = path.parent() {
      let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).read(true).append(true).open(&path) {
      Ok(f) => Some(f),
      Err(e) => {
        warn!("could not open disk paging file at {:?}: {} - paging disabled", path, e);
        None
      }
    };

    DiskSegment { file, path, records: VecDeque::new() }
  }

  pub fn is_available(&self) -> bool {
    self.file.is_some()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Appends `cmd` to the durability log and the in-memory FIFO.
  pub fn push(&mut self, cmd: PriorityCommand) -> io::Result<()> {
    if let Some(file) = self.file.as_mut() {
      let mut buf = BytesMut::new();
      encode_record(&cmd, &mut buf);
      file.write_all(&buf)?;
      file.flush()?;
    }
    self.records.push_back(cmd);
    Ok(())
  }

  /// Removes and returns up to `n` records from the front of the FIFO.
  pub fn pop_batch(&mut self, n: usize) -> Vec<PriorityCommand> {
    let count = n.min(self.records.len());
    self.records.drain(..count).collect()
  }

  /// Drops the in-memory FIFO without touching the backing file, matching
  /// the source's `clearQueue()` (which clears `diskQueue_` but leaves the
  /// fstream alone until shutdown).
  pub fn clear(&mut self) {
    self.records.clear();
  }

  /// Closes and removes the backing file (clean shutdown, per source).
  pub fn close(&mut self) {
    self.file = None;
    let _ = fs::remove_file(&self.path);
  }
}

impl Drop for DiskSegment {
  fn drop(&mut self) {
    self.close();
  }
}

fn encode_record(cmd: &PriorityCommand, buf: &mut BytesMut) {
  buf.put_i32_le(cmd.priority);
  buf.put_u64_le(cmd.sequence_id);

  let cmd_bytes = cmd.command.as_bytes();
  buf.put_u64_le(cmd_bytes.len() as u64);
  buf.put_slice(cmd_bytes);

  let job_bytes = cmd.job_id.as_bytes();
  buf.put_u64_le(job_bytes.len() as u64);
  buf.put_slice(job_bytes);
}

/// Decodes one record from `buf`, per spec §4.4's binary layout. Exposed
/// for offline recovery tooling; the live processing loop dequeues from the
/// in-memory FIFO rather than re-reading the file.
pub fn decode_record(buf: &mut impl Buf) -> Option<PriorityCommand> {
  if buf.remaining() < 20 {
    return None;
  }
  let priority = buf.get_i32_le();
  let sequence_id = buf.get_u64_le();
  let cmd_len = buf.get_u64_le() as usize;

  if buf.remaining() < cmd_len + 8 {
    return None;
  }
  let mut cmd_bytes = vec![0u8; cmd_len];
  buf.copy_to_slice(&mut cmd_bytes);
  let command = String::from_utf8_lossy(&cmd_bytes).to_string();

  let job_len = buf.get_u64_le() as usize;
  if buf.remaining() < job_len {
    return None;
  }
  let mut job_bytes = vec![0u8; job_len];
  buf.copy_to_slice(&mut job_bytes);
  let job_id = String::from_utf8_lossy(&job_bytes).to_string();

  Some(PriorityCommand { command, priority, job_id, sequence_id })
}
