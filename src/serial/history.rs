//! Bounded command-number -> rendered-text history, used to answer RESEND
//! requests. Scoped to a single protocol engine instance; owned exclusively
//! by it (see spec §4.2, §9 on avoiding cyclic ownership).

use std::collections::BTreeMap;

const MAX_HISTORY_SIZE: usize = 100;

#[derive(Debug, Default)]
pub struct CommandHistory {
  entries: BTreeMap<u16, String>,
}

impl CommandHistory {
  pub fn new() -> Self {
    CommandHistory { entries: BTreeMap::new() }
  }

  /// Stores `text` under `number`, evicting the smallest key first if the
  /// history is already at capacity.
  pub fn store(&mut self, number: u16, text: impl Into<String>) {
    if self.entries.len() >= MAX_HISTORY_SIZE && !self.entries.contains_key(&number) {
      if let Some(&min_key) = self.entries.keys().next() {
        self.entries.remove(&min_key);
      }
    }
    self.entries.insert(number, text.into());
  }

  pub fn get(&self, number: u16) -> Option<&str> {
    self.entries.get(&number).map(|s| s.as_str())
  }

  pub fn remove(&mut self, number: u16) -> bool {
    self.entries.remove(&number).is_some()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn evicts_smallest_key_when_full() {
    let mut history = CommandHistory::new();
    for n in 0..MAX_HISTORY_SIZE as u16 {
      history.store(n, format!("cmd {}", n));
    }
    assert_eq!(history.len(), MAX_HISTORY_SIZE);

    history.store(MAX_HISTORY_SIZE as u16, "overflow");
    assert_eq!(history.len(), MAX_HISTORY_SIZE);
    assert!(history.get(0).is_none());
    assert_eq!(history.get(MAX_HISTORY_SIZE as u16), Some("overflow"));
  }

  #[test]
  fn get_and_remove() {
    let mut history = CommandHistory::new();
    history.store(5, "N5 M10 *1");
    assert_eq!(history.get(5), Some("N5 M10 *1"));
    assert!(history.remove(5));
    assert!(history.get(5).is_none());
    assert!(!history.remove(5));
  }

  #[test]
  fn bound_holds_across_many_stores() {
    let mut history = CommandHistory::new();
    for n in 0..10_000u32 {
      history.store((n % u16::MAX as u32) as u16, "x");
      assert!(history.len() <= MAX_HISTORY_SIZE);
    }
  }
}
