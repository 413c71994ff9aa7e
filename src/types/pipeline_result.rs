//! Outcome of one pipeline run and live status snapshots.

use super::{CounterSnapshot, StepState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// First fatal error of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
  pub step: String,
  pub copy: usize,
  pub message: String,
}

/// Final state of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
  pub step: String,
  pub copy: usize,
  pub state: StepState,
  pub counters: CounterSnapshot,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Live view of one worker, taken while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatus {
  pub step: String,
  pub copy: usize,
  pub state: StepState,
  pub counters: CounterSnapshot,
  /// Rows waiting in this worker's input channels.
  pub input_buffered: usize,
  /// Rows waiting in this worker's output channels.
  pub output_buffered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
  pub run_id: Uuid,
  pub pipeline: String,
  pub steps: Vec<StepReport>,
  pub first_error: Option<StepFailure>,
  /// Every worker reached a terminal state.
  pub finished: bool,
  /// A safe stop was requested; a successful run is then intentionally truncated.
  pub safe_stopped: bool,
  pub aborted: bool,
  pub elapsed_ms: u64,
}

impl PipelineResult {
  /// Every worker FINISHED and no fatal error was recorded.
  pub fn is_success(&self) -> bool {
    self.finished
      && self.first_error.is_none()
      && self.steps.iter().all(|s| s.state == StepState::Finished)
  }

  pub fn is_truncated(&self) -> bool {
    self.is_success() && self.safe_stopped
  }

  pub fn step(&self, name: &str, copy: usize) -> Option<&StepReport> {
    self.steps.iter().find(|s| s.step == name && s.copy == copy)
  }

  /// Counters of every copy of `name`, summed.
  pub fn step_totals(&self, name: &str) -> Option<CounterSnapshot> {
    self
      .steps
      .iter()
      .filter(|s| s.step == name)
      .map(|s| s.counters)
      .reduce(CounterSnapshot::merged)
  }

  pub fn errors(&self) -> u64 {
    self.steps.iter().map(|s| s.counters.errors).sum()
  }
}
