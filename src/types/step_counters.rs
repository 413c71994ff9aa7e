//! Per-worker row counters, shared between the running worker and status readers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StepCounters {
  lines_read: AtomicU64,
  lines_written: AtomicU64,
  lines_input: AtomicU64,
  lines_output: AtomicU64,
  lines_updated: AtomicU64,
  lines_rejected: AtomicU64,
  errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
  /// Rows taken from input channels.
  pub lines_read: u64,
  /// Once per `put_row`, whatever the fan-out.
  pub lines_written: u64,
  /// External reads (lookups against a store).
  pub lines_input: u64,
  pub lines_output: u64,
  pub lines_updated: u64,
  pub lines_rejected: u64,
  pub errors: u64,
}

impl StepCounters {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_read(&self, n: u64) {
    self.lines_read.fetch_add(n, Ordering::Relaxed);
  }

  pub fn add_written(&self, n: u64) {
    self.lines_written.fetch_add(n, Ordering::Relaxed);
  }

  pub fn add_input(&self, n: u64) {
    self.lines_input.fetch_add(n, Ordering::Relaxed);
  }

  pub fn add_output(&self, n: u64) {
    self.lines_output.fetch_add(n, Ordering::Relaxed);
  }

  pub fn add_updated(&self, n: u64) {
    self.lines_updated.fetch_add(n, Ordering::Relaxed);
  }

  pub fn add_rejected(&self, n: u64) {
    self.lines_rejected.fetch_add(n, Ordering::Relaxed);
  }

  pub fn add_errors(&self, n: u64) {
    self.errors.fetch_add(n, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> CounterSnapshot {
    CounterSnapshot {
      lines_read: self.lines_read.load(Ordering::Relaxed),
      lines_written: self.lines_written.load(Ordering::Relaxed),
      lines_input: self.lines_input.load(Ordering::Relaxed),
      lines_output: self.lines_output.load(Ordering::Relaxed),
      lines_updated: self.lines_updated.load(Ordering::Relaxed),
      lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
      errors: self.errors.load(Ordering::Relaxed),
    }
  }
}

impl CounterSnapshot {
  /// Field-wise sum, used to aggregate copies of one step.
  pub fn merged(self, other: CounterSnapshot) -> CounterSnapshot {
    CounterSnapshot {
      lines_read: self.lines_read + other.lines_read,
      lines_written: self.lines_written + other.lines_written,
      lines_input: self.lines_input + other.lines_input,
      lines_output: self.lines_output + other.lines_output,
      lines_updated: self.lines_updated + other.lines_updated,
      lines_rejected: self.lines_rejected + other.lines_rejected,
      errors: self.errors + other.errors,
    }
  }
}
