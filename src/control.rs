//! Pipeline-wide stop signals, failure policy and the cloneable [`PipelineHandle`].

use crate::channel::RowChannel;
use crate::config::FailurePolicy;
use crate::types::{StepFailure, StepStatus};
use crate::worker::WorkerStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

pub(crate) struct PipelineControl {
  run_id: Uuid,
  name: String,
  policy: FailurePolicy,
  cancel: CancellationToken,
  safe_stop: AtomicBool,
  aborted: AtomicBool,
  first_error: Mutex<Option<StepFailure>>,
  /// Externally fed channels closed by safe stop.
  entry_channels: Mutex<Vec<Arc<RowChannel>>>,
  workers: Mutex<Vec<Arc<WorkerStatus>>>,
}

impl PipelineControl {
  pub(crate) fn new(name: impl Into<String>, policy: FailurePolicy) -> Arc<Self> {
    Arc::new(Self {
      run_id: Uuid::new_v4(),
      name: name.into(),
      policy,
      cancel: CancellationToken::new(),
      safe_stop: AtomicBool::new(false),
      aborted: AtomicBool::new(false),
      first_error: Mutex::new(None),
      entry_channels: Mutex::new(Vec::new()),
      workers: Mutex::new(Vec::new()),
    })
  }

  pub(crate) fn cancel_token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub(crate) fn register_entry(&self, channel: Arc<RowChannel>) {
    let mut entries = self.entry_channels.lock();
    if self.safe_stop.load(Ordering::SeqCst) {
      channel.stop_accepting();
    }
    entries.push(channel);
  }

  pub(crate) fn register_worker(&self, status: Arc<WorkerStatus>) {
    self.workers.lock().push(status);
  }

  pub(crate) fn is_safe_stopping(&self) -> bool {
    self.safe_stop.load(Ordering::SeqCst)
  }

  pub(crate) fn first_error(&self) -> Option<StepFailure> {
    self.first_error.lock().clone()
  }

  pub(crate) fn was_aborted(&self) -> bool {
    self.aborted.load(Ordering::SeqCst)
  }

  /// Records a worker's fatal error and applies the failure policy.
  pub(crate) fn report_failure(&self, step: &str, copy: usize, message: String) {
    error!(pipeline = %self.name, step, copy, error = %message, "step failed");
    {
      let mut first = self.first_error.lock();
      if first.is_none() {
        *first = Some(StepFailure {
          step: step.to_string(),
          copy,
          message,
        });
      }
    }
    match self.policy {
      FailurePolicy::Abort => {
        if !self.cancel.is_cancelled() {
          info!(pipeline = %self.name, "failure policy abort: stopping all steps");
          self.cancel.cancel();
        }
      }
      FailurePolicy::IsolateBranch => {}
    }
  }
}

/// Cheap, cloneable control surface of a running pipeline. All methods are idempotent and
/// may be called from any thread.
#[derive(Clone)]
pub struct PipelineHandle {
  control: Arc<PipelineControl>,
}

impl PipelineHandle {
  pub(crate) fn new(control: Arc<PipelineControl>) -> Self {
    Self { control }
  }

  pub fn run_id(&self) -> Uuid {
    self.control.run_id
  }

  pub fn pipeline_name(&self) -> &str {
    &self.control.name
  }

  /// Stops the sources and the external entry channels; rows already in flight drain.
  pub fn safe_stop(&self) {
    if self.control.safe_stop.swap(true, Ordering::SeqCst) {
      return;
    }
    info!(pipeline = %self.control.name, run_id = %self.control.run_id, "safe stop requested");
    for channel in self.control.entry_channels.lock().iter() {
      channel.stop_accepting();
    }
  }

  /// Stops every worker at its next suspension point without draining.
  pub fn stop_all(&self) {
    if self.control.aborted.swap(true, Ordering::SeqCst) {
      return;
    }
    info!(pipeline = %self.control.name, run_id = %self.control.run_id, "stop all requested");
    self.control.cancel.cancel();
  }

  pub fn is_safe_stopping(&self) -> bool {
    self.control.is_safe_stopping()
  }

  /// True once workers were told to stop immediately, by `stop_all` or by the failure policy.
  pub fn is_stopped(&self) -> bool {
    self.control.cancel.is_cancelled()
  }

  pub fn first_error(&self) -> Option<StepFailure> {
    self.control.first_error()
  }

  /// Live state, counters and buffer levels of every worker.
  pub fn status(&self) -> Vec<StepStatus> {
    self
      .control
      .workers
      .lock()
      .iter()
      .map(|w| w.snapshot())
      .collect()
  }

  pub(crate) fn control(&self) -> &Arc<PipelineControl> {
    &self.control
  }
}

impl std::fmt::Debug for PipelineHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PipelineHandle")
      .field("pipeline", &self.control.name)
      .field("run_id", &self.control.run_id)
      .field("safe_stopping", &self.is_safe_stopping())
      .field("stopped", &self.is_stopped())
      .finish()
  }
}
