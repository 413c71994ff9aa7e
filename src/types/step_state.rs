//! Worker run-state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ```text
/// INIT -> RUNNING -> FINISHED
/// RUNNING -> STOPPING -> FINISHED   (safe stop)
/// RUNNING -> STOPPED                (abort)
/// INIT | RUNNING -> ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StepState {
  Init = 0,
  Running = 1,
  Stopping = 2,
  Finished = 3,
  Stopped = 4,
  Error = 5,
}

impl StepState {
  pub fn is_terminal(self) -> bool {
    matches!(self, StepState::Finished | StepState::Stopped | StepState::Error)
  }

  pub(crate) fn from_u8(v: u8) -> StepState {
    match v {
      0 => StepState::Init,
      1 => StepState::Running,
      2 => StepState::Stopping,
      3 => StepState::Finished,
      4 => StepState::Stopped,
      _ => StepState::Error,
    }
  }
}

impl fmt::Display for StepState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepState::Init => write!(f, "init"),
      StepState::Running => write!(f, "running"),
      StepState::Stopping => write!(f, "stopping"),
      StepState::Finished => write!(f, "finished"),
      StepState::Stopped => write!(f, "stopped"),
      StepState::Error => write!(f, "error"),
    }
  }
}
