//! Tests for `PipelineResult`.

use super::{CounterSnapshot, PipelineResult, StepFailure, StepReport, StepState};
use uuid::Uuid;

fn report(step: &str, copy: usize, state: StepState, read: u64) -> StepReport {
  StepReport {
    step: step.to_string(),
    copy,
    state,
    counters: CounterSnapshot {
      lines_read: read,
      ..CounterSnapshot::default()
    },
    error: None,
  }
}

fn result(steps: Vec<StepReport>) -> PipelineResult {
  PipelineResult {
    run_id: Uuid::new_v4(),
    pipeline: "p".to_string(),
    steps,
    first_error: None,
    finished: true,
    safe_stopped: false,
    aborted: false,
    elapsed_ms: 1,
  }
}

#[test]
fn success_requires_all_finished() {
  let ok = result(vec![report("a", 0, StepState::Finished, 0)]);
  assert!(ok.is_success());
  assert!(!ok.is_truncated());
  let stopped = result(vec![
    report("a", 0, StepState::Finished, 0),
    report("b", 0, StepState::Stopped, 0),
  ]);
  assert!(!stopped.is_success());
}

#[test]
fn first_error_fails_the_run() {
  let mut r = result(vec![report("a", 0, StepState::Finished, 0)]);
  r.first_error = Some(StepFailure {
    step: "a".to_string(),
    copy: 0,
    message: "boom".to_string(),
  });
  assert!(!r.is_success());
}

#[test]
fn safe_stopped_success_is_truncated() {
  let mut r = result(vec![report("a", 0, StepState::Finished, 0)]);
  r.safe_stopped = true;
  assert!(r.is_truncated());
}

#[test]
fn totals_sum_copies() {
  let r = result(vec![
    report("a", 0, StepState::Finished, 2),
    report("a", 1, StepState::Finished, 3),
    report("b", 0, StepState::Finished, 7),
  ]);
  assert_eq!(r.step_totals("a").unwrap().lines_read, 5);
  assert_eq!(r.step("a", 1).unwrap().counters.lines_read, 3);
  assert!(r.step_totals("zzz").is_none());
}
