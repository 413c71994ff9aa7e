//! One worker per step copy: lifecycle state machine and run loop.
//!
//! ```text
//! INIT --init ok--> RUNNING --eof--> FINISHED
//! RUNNING --safe stop--> STOPPING --drained--> FINISHED
//! RUNNING --abort--> STOPPED
//! RUNNING --fatal error--> ERROR
//! INIT --init fails--> ERROR
//! ```

use crate::channel::RowChannel;
use crate::control::PipelineControl;
use crate::error::StepError;
use crate::step::Step;
use crate::step_io::StepIo;
use crate::types::{StepCounters, StepReport, StepState, StepStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// State, counters and channels of one worker, readable while it runs.
pub(crate) struct WorkerStatus {
  step: String,
  copy: usize,
  state: AtomicU8,
  counters: Arc<StepCounters>,
  inputs: Mutex<Vec<Arc<RowChannel>>>,
  outputs: Mutex<Vec<Arc<RowChannel>>>,
}

impl WorkerStatus {
  fn new(step: &str, copy: usize, counters: Arc<StepCounters>) -> Self {
    Self {
      step: step.to_string(),
      copy,
      state: AtomicU8::new(StepState::Init as u8),
      counters,
      inputs: Mutex::new(Vec::new()),
      outputs: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn state(&self) -> StepState {
    StepState::from_u8(self.state.load(Ordering::SeqCst))
  }

  fn set_state(&self, state: StepState) {
    self.state.store(state as u8, Ordering::SeqCst);
  }

  pub(crate) fn snapshot(&self) -> StepStatus {
    StepStatus {
      step: self.step.clone(),
      copy: self.copy,
      state: self.state(),
      counters: self.counters.snapshot(),
      input_buffered: self.inputs.lock().iter().map(|c| c.len()).sum(),
      output_buffered: self.outputs.lock().iter().map(|c| c.len()).sum(),
    }
  }
}

enum Outcome {
  Finished,
  Stopped,
  UpstreamFailed(String),
  Failed(StepError),
}

pub(crate) struct StepWorker {
  step: Box<dyn Step>,
  io: StepIo,
  status: Arc<WorkerStatus>,
  control: Arc<PipelineControl>,
}

impl StepWorker {
  pub(crate) fn new(
    step: Box<dyn Step>,
    io: StepIo,
    counters: Arc<StepCounters>,
    control: Arc<PipelineControl>,
  ) -> Self {
    let ctx = io.context();
    let status = Arc::new(WorkerStatus::new(ctx.step_name(), ctx.copy(), counters));
    control.register_worker(status.clone());
    Self {
      step,
      io,
      status,
      control,
    }
  }

  pub(crate) fn step_name(&self) -> &str {
    self.io.context().step_name()
  }

  pub(crate) fn copy(&self) -> usize {
    self.io.context().copy()
  }

  pub(crate) fn io_mut(&mut self) -> &mut StepIo {
    &mut self.io
  }

  /// Publishes the final channel wiring to the status snapshot.
  pub(crate) fn refresh_channels(&self) {
    *self.status.inputs.lock() = self.io.input_channels();
    *self.status.outputs.lock() = self.io.output_channels();
  }

  pub(crate) async fn init(&mut self) -> Result<(), StepError> {
    let r = self.step.init(self.io.context()).await;
    match &r {
      Ok(()) => debug!(step = %self.step_name(), copy = self.copy(), "step initialized"),
      Err(e) => {
        warn!(step = %self.step_name(), copy = self.copy(), error = %e, "step init failed");
        self.status.set_state(StepState::Error);
      }
    }
    r
  }

  /// Ends a worker that never ran because the pipeline failed to start.
  pub(crate) async fn abandon(mut self, error: Option<String>) -> StepReport {
    let state = if error.is_some() {
      StepState::Error
    } else {
      StepState::Stopped
    };
    self.io.set_output_done();
    self.io.close_inputs();
    self.step.dispose(self.io.context()).await;
    self.status.set_state(state);
    self.report(state, error)
  }

  /// Waits for the start gate, runs until a terminal state, disposes the step.
  pub(crate) async fn run(self, gate: watch::Receiver<bool>) -> StepReport {
    let span = info_span!(
      "worker",
      run_id = %self.io.context().run_id(),
      step = %self.step_name(),
      copy = self.copy()
    );
    self.run_inner(gate).instrument(span).await
  }

  async fn run_inner(mut self, mut gate: watch::Receiver<bool>) -> StepReport {
    let cancel = self.control.cancel_token().clone();
    tokio::select! {
      biased;
      _ = cancel.cancelled() => {}
      _ = wait_for_start(&mut gate) => {}
    }
    let outcome = if cancel.is_cancelled() {
      Outcome::Stopped
    } else {
      self.status.set_state(StepState::Running);
      debug!("step running");
      self.run_loop(&cancel).await
    };
    self.finish(outcome).await
  }

  async fn run_loop(&mut self, cancel: &CancellationToken) -> Outcome {
    let mut stopping = false;
    loop {
      if cancel.is_cancelled() {
        return Outcome::Stopped;
      }
      if !stopping && self.control.is_safe_stopping() {
        if self.io.is_source() {
          info!("safe stop: source stops producing");
          return Outcome::Finished;
        }
        stopping = true;
        self.status.set_state(StepState::Stopping);
        debug!("safe stop: draining input");
      }
      let step = &mut self.step;
      let io = &mut self.io;
      let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StepError::Aborted),
        r = step.process_one_iteration(io) => r,
      };
      match result {
        Ok(true) => {}
        Ok(false) => return Outcome::Finished,
        Err(StepError::Aborted) => return Outcome::Stopped,
        // Nobody reads this step's rows any more; its work is over.
        Err(StepError::OutputsClosed) => return Outcome::Finished,
        Err(StepError::UpstreamFailed(channel)) => return Outcome::UpstreamFailed(channel),
        Err(e) => return Outcome::Failed(e),
      }
    }
  }

  async fn finish(mut self, outcome: Outcome) -> StepReport {
    let (state, error) = match outcome {
      Outcome::Finished => {
        self.io.set_output_done();
        (StepState::Finished, None)
      }
      Outcome::Stopped => {
        self.io.set_output_done();
        (StepState::Stopped, None)
      }
      Outcome::UpstreamFailed(channel) => {
        self.io.set_output_failed();
        (StepState::Stopped, Some(format!("upstream channel {} failed", channel)))
      }
      Outcome::Failed(e) => {
        let message = e.to_string();
        self.io.counters().add_errors(1);
        self.io.set_output_failed();
        self
          .control
          .report_failure(self.io.context().step_name(), self.copy(), message.clone());
        (StepState::Error, Some(message))
      }
    };
    self.io.close_inputs();
    self.step.dispose(self.io.context()).await;
    self.status.set_state(state);
    let counters = self.io.counters().snapshot();
    info!(
      state = %state,
      read = counters.lines_read,
      written = counters.lines_written,
      rejected = counters.lines_rejected,
      errors = counters.errors,
      "step ended"
    );
    self.report(state, error)
  }

  fn report(&self, state: StepState, error: Option<String>) -> StepReport {
    StepReport {
      step: self.step_name().to_string(),
      copy: self.copy(),
      state,
      counters: self.io.counters().snapshot(),
      error,
    }
  }
}

async fn wait_for_start(gate: &mut watch::Receiver<bool>) {
  // A dropped sender leaves the gate closed; cancellation then ends the worker.
  if gate.wait_for(|started| *started).await.is_err() {
    std::future::pending::<()>().await;
  }
}
