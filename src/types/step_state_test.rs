//! Tests for `StepState`.

use super::StepState;

#[test]
fn terminal_states() {
  assert!(StepState::Finished.is_terminal());
  assert!(StepState::Stopped.is_terminal());
  assert!(StepState::Error.is_terminal());
  assert!(!StepState::Init.is_terminal());
  assert!(!StepState::Running.is_terminal());
  assert!(!StepState::Stopping.is_terminal());
}

#[test]
fn u8_roundtrip() {
  for s in [
    StepState::Init,
    StepState::Running,
    StepState::Stopping,
    StepState::Finished,
    StepState::Stopped,
    StepState::Error,
  ] {
    assert_eq!(StepState::from_u8(s as u8), s);
  }
}

#[test]
fn display_and_serde_agree() {
  assert_eq!(StepState::Stopping.to_string(), "stopping");
  assert_eq!(serde_json::to_string(&StepState::Stopping).unwrap(), "\"stopping\"");
}
