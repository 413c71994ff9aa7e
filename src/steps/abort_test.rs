//! Tests for `AbortStep` modes.

use super::{AbortConfig, AbortMode};
use crate::compiler::compile_pipeline;
use crate::resources::SharedResources;
use crate::step::StepRegistry;
use crate::test_support::{chain, generator};
use crate::types::{NodeRecord, PipelineResult, StepState};
use serde_json::json;
use std::time::Duration;

async fn run_with_abort(limit: Option<u64>, config: serde_json::Value) -> PipelineResult {
  let mut desc = chain(
    "abort",
    vec![
      generator("gen", limit),
      NodeRecord::new("guard", "abort").with_config(config),
      NodeRecord::new("sink", "dummy"),
    ],
  );
  desc.engine.channel_capacity = 10;
  let mut pipeline =
    compile_pipeline(&desc, &StepRegistry::with_builtin(), &SharedResources::new()).unwrap();
  pipeline.start().await.unwrap();
  tokio::time::timeout(Duration::from_secs(10), pipeline.wait_until_finished())
    .await
    .expect("abort step must end the run")
    .unwrap()
}

#[test]
fn config_defaults() {
  let config: AbortConfig = serde_json::from_value(json!({})).unwrap();
  assert_eq!(config.row_threshold, 0);
  assert_eq!(config.mode, AbortMode::AbortWithError);
  assert!(!config.abort_on_empty_input);
  let safe: AbortConfig = serde_json::from_value(json!({"mode": "safe_stop"})).unwrap();
  assert_eq!(safe.mode, AbortMode::SafeStop);
}

#[tokio::test]
async fn abort_with_error_fails_the_run() {
  let result = run_with_abort(
    None,
    json!({"row_threshold": 3, "message": "too many rows"}),
  )
  .await;
  assert!(!result.is_success());
  assert!(result.aborted);
  let guard = result.step("guard", 0).unwrap();
  assert_eq!(guard.state, StepState::Error);
  assert_eq!(guard.counters.lines_read, 4);
  assert_eq!(guard.counters.lines_written, 3);
  let failure = result.first_error.unwrap();
  assert_eq!(failure.step, "guard");
  assert_eq!(failure.message, "too many rows");
}

#[tokio::test]
async fn plain_abort_stops_without_an_error() {
  let result = run_with_abort(None, json!({"row_threshold": 2, "mode": "abort"})).await;
  assert!(!result.is_success());
  assert!(result.aborted);
  assert!(result.first_error.is_none());
  assert_eq!(result.step("guard", 0).unwrap().state, StepState::Stopped);
}

#[tokio::test]
async fn safe_stop_mode_drains_and_succeeds() {
  let result = run_with_abort(None, json!({"row_threshold": 5, "mode": "safe_stop"})).await;
  assert!(result.is_success(), "{:?}", result);
  assert!(result.is_truncated());
  let written = result.step_totals("gen").unwrap().lines_written;
  assert!(written > 5);
  assert_eq!(result.step_totals("sink").unwrap().lines_read, written);
}

#[tokio::test]
async fn below_threshold_passes_everything() {
  let result = run_with_abort(Some(4), json!({"row_threshold": 10})).await;
  assert!(result.is_success());
  assert_eq!(result.step_totals("sink").unwrap().lines_read, 4);
}

#[tokio::test]
async fn empty_input_aborts_only_when_asked() {
  let quiet = run_with_abort(Some(0), json!({})).await;
  assert!(quiet.is_success());

  let strict = run_with_abort(Some(0), json!({"abort_on_empty_input": true})).await;
  assert!(!strict.is_success());
  assert_eq!(strict.step("guard", 0).unwrap().state, StepState::Error);
}
