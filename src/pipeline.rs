//! A compiled pipeline: start, stop, wait, plus row producers and output taps.

use crate::channel::RowChannel;
use crate::config::EngineConfig;
use crate::control::{PipelineControl, PipelineHandle};
use crate::error::{EngineError, GraphError};
use crate::producer::RowProducer;
use crate::types::{PipelineResult, Row, Schema, StepReport, StepState, StepStatus};
use crate::worker::StepWorker;
use futures::Stream;
use futures::future::join_all;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Stream of rows read from an output tap.
pub type RowStream = Pin<Box<dyn Stream<Item = Row> + Send>>;

/// Reader side of an extra output channel of one step copy. The tap receives a copy of
/// every row the step writes and must be read, or the step blocks once it is full.
/// Dropping the tap detaches it from the step.
pub struct OutputTap {
  channel: Arc<RowChannel>,
}

impl OutputTap {
  /// Next row, `None` once the step ended.
  pub async fn next_row(&self) -> Option<Row> {
    self.channel.get().await
  }

  /// Known after the first row.
  pub fn schema(&self) -> Option<Schema> {
    self.channel.schema().cloned()
  }

  pub fn into_stream(self) -> RowStream {
    let tap = self;
    Box::pin(async_stream::stream! {
      while let Some(row) = tap.channel.get().await {
        yield row;
      }
    })
  }

  /// Reads every remaining row.
  pub async fn collect(self) -> Vec<Row> {
    let mut rows = Vec::new();
    while let Some(row) = self.channel.get().await {
      rows.push(row);
    }
    rows
  }
}

impl Drop for OutputTap {
  fn drop(&mut self) {
    self.channel.close_consumer();
  }
}

enum Phase {
  Prepared(Vec<StepWorker>),
  Running(Vec<(String, usize, JoinHandle<StepReport>)>),
  InitFailed(Vec<StepReport>),
  Finished(Box<PipelineResult>),
  Transition,
}

pub struct Pipeline {
  name: String,
  config: EngineConfig,
  control: Arc<PipelineControl>,
  handle: PipelineHandle,
  phase: Phase,
  started_at: Option<Instant>,
}

impl Pipeline {
  pub(crate) fn new(
    name: String,
    config: EngineConfig,
    control: Arc<PipelineControl>,
    workers: Vec<StepWorker>,
  ) -> Self {
    Self {
      name,
      config,
      handle: PipelineHandle::new(control.clone()),
      control,
      phase: Phase::Prepared(workers),
      started_at: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn run_id(&self) -> Uuid {
    self.handle.run_id()
  }

  /// Cloneable control surface, usable from other tasks and threads.
  pub fn handle(&self) -> PipelineHandle {
    self.handle.clone()
  }

  pub fn safe_stop(&self) {
    self.handle.safe_stop();
  }

  pub fn stop_all(&self) {
    self.handle.stop_all();
  }

  pub fn status(&self) -> Vec<StepStatus> {
    self.handle.status()
  }

  fn prepared_worker(&mut self, step: &str, copy: usize) -> Result<&mut StepWorker, EngineError> {
    let Phase::Prepared(workers) = &mut self.phase else {
      return Err(EngineError::AlreadyStarted);
    };
    workers
      .iter_mut()
      .find(|w| w.step_name() == step && w.copy() == copy)
      .ok_or_else(|| GraphError::UnknownCopy(step.to_string(), copy).into())
  }

  /// Adds an extra input channel to `step` copy `copy`, fed from outside the pipeline.
  /// Must be called before [`Self::start`].
  pub fn add_row_producer(&mut self, step: &str, copy: usize) -> Result<RowProducer, EngineError> {
    let capacity = self.config.channel_capacity;
    let cancel = self.control.cancel_token().clone();
    let worker = self.prepared_worker(step, copy)?;
    let channel = Arc::new(RowChannel::new(
      format!("producer -> {}.{}", step, copy),
      capacity,
    ));
    worker
      .io_mut()
      .add_input(format!("producer:{}.{}", step, copy), channel.clone());
    self.control.register_entry(channel.clone());
    info!(step, copy, "row producer added");
    Ok(RowProducer::new(step, copy, channel, cancel))
  }

  /// Adds an extra output channel to `step` copy `copy` that receives every row it writes.
  /// Must be called before [`Self::start`].
  pub fn add_output_tap(&mut self, step: &str, copy: usize) -> Result<OutputTap, EngineError> {
    let capacity = self.config.channel_capacity;
    let worker = self.prepared_worker(step, copy)?;
    let channel = Arc::new(RowChannel::new(format!("{}.{} -> tap", step, copy), capacity));
    worker.io_mut().add_tap(channel.clone());
    Ok(OutputTap { channel })
  }

  /// Initializes every worker, then launches one task per worker. If any init fails, every
  /// worker is disposed and no run loop executes.
  #[instrument(level = "trace", skip(self), fields(pipeline = %self.name))]
  pub async fn start(&mut self) -> Result<(), EngineError> {
    let mut workers = match std::mem::replace(&mut self.phase, Phase::Transition) {
      Phase::Prepared(workers) => workers,
      other => {
        self.phase = other;
        return Err(EngineError::AlreadyStarted);
      }
    };
    info!(run_id = %self.run_id(), workers = workers.len(), "starting pipeline");
    self.started_at = Some(Instant::now());

    let results = join_all(workers.iter_mut().map(|w| w.init())).await;
    let mut first_failure = None;
    let mut init_errors = Vec::with_capacity(results.len());
    for (worker, r) in workers.iter().zip(results) {
      match r {
        Ok(()) => init_errors.push(None),
        Err(e) => {
          init_errors.push(Some(e.to_string()));
          if first_failure.is_none() {
            first_failure = Some((worker.step_name().to_string(), worker.copy(), e));
          }
        }
      }
    }
    if let Some((step, copy, source)) = first_failure {
      self
        .control
        .report_failure(&step, copy, format!("init failed: {}", source));
      let reports = join_all(
        workers
          .into_iter()
          .zip(init_errors)
          .map(|(w, e)| w.abandon(e)),
      )
      .await;
      self.phase = Phase::InitFailed(reports);
      return Err(EngineError::InitFailed { step, copy, source });
    }

    let (gate_tx, gate_rx) = watch::channel(false);
    let handles = workers
      .into_iter()
      .map(|w| {
        w.refresh_channels();
        let step = w.step_name().to_string();
        let copy = w.copy();
        (step, copy, tokio::spawn(w.run(gate_rx.clone())))
      })
      .collect();
    self.phase = Phase::Running(handles);
    let _ = gate_tx.send(true);
    info!(run_id = %self.run_id(), "pipeline running");
    Ok(())
  }

  /// Waits until every worker is terminal and aggregates the run. Calling it again returns
  /// the same result.
  pub async fn wait_until_finished(&mut self) -> Result<PipelineResult, EngineError> {
    let (reports, finished) = match std::mem::replace(&mut self.phase, Phase::Transition) {
      Phase::Running(handles) => {
        let mut reports = Vec::with_capacity(handles.len());
        for (step, copy, handle) in handles {
          match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
              let message = format!("worker task failed: {}", e);
              error!(step = %step, copy, error = %message, "worker task did not complete");
              self.control.report_failure(&step, copy, message.clone());
              reports.push(StepReport {
                step,
                copy,
                state: StepState::Error,
                counters: Default::default(),
                error: Some(message),
              });
            }
          }
        }
        (reports, true)
      }
      Phase::InitFailed(reports) => (reports, false),
      Phase::Finished(result) => {
        let copy = (*result).clone();
        self.phase = Phase::Finished(result);
        return Ok(copy);
      }
      other => {
        self.phase = other;
        return Err(EngineError::NotStarted);
      }
    };

    let result = PipelineResult {
      run_id: self.run_id(),
      pipeline: self.name.clone(),
      steps: reports,
      first_error: self.control.first_error(),
      finished,
      safe_stopped: self.handle.is_safe_stopping(),
      aborted: self.control.was_aborted(),
      elapsed_ms: self
        .started_at
        .map(|t| t.elapsed().as_millis() as u64)
        .unwrap_or_default(),
    };
    info!(
      run_id = %result.run_id,
      success = result.is_success(),
      truncated = result.is_truncated(),
      elapsed_ms = result.elapsed_ms,
      "pipeline finished"
    );
    self.phase = Phase::Finished(Box::new(result.clone()));
    Ok(result)
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    if matches!(self.phase, Phase::Running(_)) {
      self.control.cancel_token().cancel();
    }
  }
}
