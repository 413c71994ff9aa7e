//! Row I/O of one worker: fan-in over input channels, fan-out over output edges, error
//! routing, schemas and counters.
//!
//! Every blocking channel operation races the pipeline's cancellation token, so an abort
//! reaches a worker at its next put or get.

use crate::channel::{RowChannel, TryGet};
use crate::error::{ChannelError, StepError};
use crate::row_codec::encode_key;
use crate::step::StepContext;
use crate::types::{
  Distribution, FanOut, Row, RowErrorCause, Schema, StepCounters, error_fields,
};
use futures::future::select_all;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

/// One input channel and the step feeding it.
pub(crate) struct InputChannel {
  pub(crate) from: String,
  pub(crate) channel: Arc<RowChannel>,
}

/// Channels of one outgoing edge, one per reachable target copy.
pub(crate) struct OutputEdge {
  target: String,
  distribution: Distribution,
  channels: Vec<Arc<RowChannel>>,
  next: usize,
  key_indexes: Option<Vec<usize>>,
}

impl OutputEdge {
  pub(crate) fn new(
    target: impl Into<String>,
    distribution: Distribution,
    channels: Vec<Arc<RowChannel>>,
  ) -> Self {
    Self {
      target: target.into(),
      distribution,
      channels,
      next: 0,
      key_indexes: None,
    }
  }

  pub(crate) fn channels(&self) -> &[Arc<RowChannel>] {
    &self.channels
  }

  /// Channel positions that receive `row`.
  fn pick(&mut self, row: &Row, schema: Option<&Schema>) -> Result<Vec<usize>, StepError> {
    let n = self.channels.len();
    match &self.distribution {
      Distribution::RoundRobin => {
        let i = self.next % n;
        self.next = i + 1;
        Ok(vec![i])
      }
      Distribution::CopyToAll => Ok((0..n).collect()),
      Distribution::Keyed { fields } => {
        if self.key_indexes.is_none() {
          let schema = schema.ok_or_else(|| {
            StepError::SchemaMismatch(format!(
              "keyed distribution to '{}' needs an output schema",
              self.target
            ))
          })?;
          self.key_indexes = Some(schema.indexes_of(fields).map_err(StepError::SchemaMismatch)?);
        }
        let indexes = self.key_indexes.as_deref().unwrap_or_default();
        let key = encode_key(row, indexes)?;
        Ok(vec![(xxh3_64(&key) % n as u64) as usize])
      }
    }
  }
}

async fn put_cancellable(
  cancel: &CancellationToken,
  channel: &RowChannel,
  row: Row,
) -> Result<(), StepError> {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(StepError::Aborted),
    r = channel.put(row) => r.map_err(StepError::from),
  }
}

fn is_closed(e: &StepError) -> bool {
  matches!(e, StepError::Channel(ChannelError::Closed(_)))
}

pub struct StepIo {
  ctx: StepContext,
  cancel: CancellationToken,
  counters: Arc<StepCounters>,
  inputs: Vec<InputChannel>,
  /// Steps with an edge into this one, fixed at build time.
  input_steps: HashSet<String>,
  next_input: usize,
  input_schema: Option<Schema>,
  outputs: Vec<OutputEdge>,
  error_output: Option<OutputEdge>,
  taps: Vec<Arc<RowChannel>>,
  fan_out: FanOut,
  next_edge: usize,
  /// Targets whose every consumer closed; rows sent to them are dropped.
  closed_targets: HashSet<String>,
  had_outputs: bool,
  output_schema: Option<Schema>,
  safe_mode: bool,
  error_put_timeout: Duration,
}

impl StepIo {
  pub(crate) fn new(
    ctx: StepContext,
    cancel: CancellationToken,
    counters: Arc<StepCounters>,
    fan_out: FanOut,
    safe_mode: bool,
    error_put_timeout: Duration,
  ) -> Self {
    Self {
      ctx,
      cancel,
      counters,
      inputs: Vec::new(),
      input_steps: HashSet::new(),
      next_input: 0,
      input_schema: None,
      outputs: Vec::new(),
      error_output: None,
      taps: Vec::new(),
      fan_out,
      next_edge: 0,
      closed_targets: HashSet::new(),
      had_outputs: false,
      output_schema: None,
      safe_mode,
      error_put_timeout,
    }
  }

  pub(crate) fn add_input(&mut self, from: impl Into<String>, channel: Arc<RowChannel>) {
    let from = from.into();
    self.input_steps.insert(from.clone());
    self.inputs.push(InputChannel { from, channel });
  }

  pub(crate) fn add_output(&mut self, edge: OutputEdge) {
    self.had_outputs = true;
    self.outputs.push(edge);
  }

  pub(crate) fn set_error_output(&mut self, edge: OutputEdge) {
    self.error_output = Some(edge);
  }

  pub(crate) fn add_tap(&mut self, channel: Arc<RowChannel>) {
    self.had_outputs = true;
    self.taps.push(channel);
  }

  pub(crate) fn input_channels(&self) -> Vec<Arc<RowChannel>> {
    self.inputs.iter().map(|i| i.channel.clone()).collect()
  }

  /// Every channel this worker writes to, error output and taps included.
  pub(crate) fn output_channels(&self) -> Vec<Arc<RowChannel>> {
    self
      .outputs
      .iter()
      .chain(self.error_output.iter())
      .flat_map(|e| e.channels.iter().cloned())
      .chain(self.taps.iter().cloned())
      .collect()
  }

  pub fn context(&self) -> &StepContext {
    &self.ctx
  }

  pub fn counters(&self) -> &StepCounters {
    &self.counters
  }

  /// True if the step had no input edge when the graph was built.
  pub fn is_source(&self) -> bool {
    self.input_steps.is_empty()
  }

  pub fn has_error_output(&self) -> bool {
    self.error_output.is_some()
  }

  pub fn is_safe_stopping(&self) -> bool {
    self.ctx.pipeline().is_safe_stopping()
  }

  pub fn is_stopped(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Names of the steps this one writes to, in edge order.
  pub fn output_targets(&self) -> Vec<&str> {
    self.outputs.iter().map(|e| e.target.as_str()).collect()
  }

  /// Sleeps for `duration` unless the pipeline is stopped first.
  pub async fn sleep(&self, duration: Duration) -> Result<(), StepError> {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(StepError::Aborted),
      _ = tokio::time::sleep(duration) => Ok(()),
    }
  }

  /// Schema of the rows read so far; known after the first row.
  pub fn input_schema(&self) -> Option<&Schema> {
    self.input_schema.as_ref()
  }

  /// Explicit output schema, or the input schema for pass-through steps.
  pub fn output_schema(&self) -> Option<&Schema> {
    self.output_schema.as_ref().or(self.input_schema.as_ref())
  }

  pub fn set_output_schema(&mut self, schema: Schema) {
    self.output_schema = Some(schema);
  }

  fn check_output_row(&self, row: &Row, schema: Option<&Schema>) -> Result<(), StepError> {
    match schema {
      Some(s) if self.safe_mode => s.check_row(row).map_err(StepError::SchemaMismatch),
      _ => Ok(()),
    }
  }

  fn accept_input(&mut self, idx: usize) -> Result<(), StepError> {
    self.counters.add_read(1);
    let Some(schema) = self.inputs[idx].channel.schema() else {
      return Ok(());
    };
    match &self.input_schema {
      None => self.input_schema = Some(schema.clone()),
      Some(existing) => {
        if self.safe_mode && !existing.is_compatible(schema) {
          return Err(StepError::SchemaMismatch(format!(
            "input {} carries {} but earlier rows had {}",
            self.inputs[idx].channel.name(),
            schema,
            existing
          )));
        }
      }
    }
    Ok(())
  }

  fn end_input(&mut self, idx: usize) -> Result<(), StepError> {
    let input = self.inputs.remove(idx);
    if self.next_input > idx {
      self.next_input -= 1;
    }
    trace!(step = %self.ctx.step_name(), channel = %input.channel.name(), "input ended");
    if input.channel.upstream_failed() {
      return Err(StepError::UpstreamFailed(input.channel.name().to_string()));
    }
    Ok(())
  }

  /// Next row from any input, rotating across inputs. `Ok(None)` once every input ended.
  pub async fn get_row(&mut self) -> Result<Option<Row>, StepError> {
    loop {
      if self.cancel.is_cancelled() {
        return Err(StepError::Aborted);
      }
      if self.inputs.is_empty() {
        return Ok(None);
      }
      let waits: Vec<Pin<Box<Notified<'_>>>> = self
        .inputs
        .iter()
        .map(|i| {
          let mut w = Box::pin(i.channel.readable());
          w.as_mut().enable();
          w
        })
        .collect();
      let n = self.inputs.len();
      let mut ended = None;
      let mut got = None;
      for offset in 0..n {
        let idx = (self.next_input + offset) % n;
        match self.inputs[idx].channel.try_get() {
          TryGet::Row(row) => {
            got = Some((idx, row));
            break;
          }
          TryGet::EndOfStream => {
            ended = Some(idx);
            break;
          }
          TryGet::Empty => {}
        }
      }
      if let Some((idx, row)) = got {
        drop(waits);
        self.next_input = (idx + 1) % n;
        self.accept_input(idx)?;
        return Ok(Some(row));
      }
      if let Some(idx) = ended {
        drop(waits);
        self.end_input(idx)?;
        continue;
      }
      tokio::select! {
        biased;
        _ = self.cancel.cancelled() => return Err(StepError::Aborted),
        _ = select_all(waits) => {}
      }
    }
  }

  /// Next row from the inputs fed by step `from`. `Ok(None)` once they all ended.
  pub async fn get_row_from(&mut self, from: &str) -> Result<Option<Row>, StepError> {
    if !self.input_steps.contains(from) {
      return Err(StepError::UnknownTarget(from.to_string()));
    }
    loop {
      let Some(idx) = self.inputs.iter().position(|i| i.from == from) else {
        return Ok(None);
      };
      let channel = self.inputs[idx].channel.clone();
      let next = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => return Err(StepError::Aborted),
        r = channel.get() => r,
      };
      match next {
        Some(row) => {
          self.accept_input(idx)?;
          return Ok(Some(row));
        }
        None => self.end_input(idx)?,
      }
    }
  }

  /// Writes `row` per the fan-out policy, once to every tap.
  pub async fn put_row(&mut self, row: Row) -> Result<(), StepError> {
    if self.cancel.is_cancelled() {
      return Err(StepError::Aborted);
    }
    let schema = self.output_schema().cloned();
    self.check_output_row(&row, schema.as_ref())?;
    self.send_to_taps(&row, schema.as_ref()).await?;
    match self.fan_out {
      FanOut::Copy => {
        let mut e = 0;
        while e < self.outputs.len() {
          if !self.send_on_edge(e, &row, schema.as_ref()).await? {
            e += 1;
          }
        }
      }
      FanOut::Distribute => {
        while !self.outputs.is_empty() {
          let e = self.next_edge % self.outputs.len();
          self.next_edge = e + 1;
          if !self.send_on_edge(e, &row, schema.as_ref()).await? {
            break;
          }
        }
      }
    }
    if self.had_outputs && self.outputs.is_empty() && self.taps.is_empty() {
      return Err(StepError::OutputsClosed);
    }
    self.counters.add_written(1);
    Ok(())
  }

  /// Writes `row` only on the edge to `target`.
  pub async fn put_row_to(&mut self, target: &str, row: Row) -> Result<(), StepError> {
    if self.cancel.is_cancelled() {
      return Err(StepError::Aborted);
    }
    let Some(e) = self.outputs.iter().position(|o| o.target == target) else {
      if self.closed_targets.contains(target) {
        trace!(step = %self.ctx.step_name(), target, "dropping row for closed target");
        return Ok(());
      }
      return Err(StepError::UnknownTarget(target.to_string()));
    };
    let schema = self.output_schema().cloned();
    self.check_output_row(&row, schema.as_ref())?;
    self.send_on_edge(e, &row, schema.as_ref()).await?;
    if self.outputs.is_empty() && self.taps.is_empty() {
      return Err(StepError::OutputsClosed);
    }
    self.counters.add_written(1);
    Ok(())
  }

  async fn send_to_taps(&mut self, row: &Row, schema: Option<&Schema>) -> Result<(), StepError> {
    let mut i = 0;
    while i < self.taps.len() {
      let tap = self.taps[i].clone();
      if let Some(s) = schema {
        tap.set_schema(s);
      }
      match put_cancellable(&self.cancel, &tap, row.clone()).await {
        Ok(()) => i += 1,
        Err(e) if is_closed(&e) => {
          debug!(step = %self.ctx.step_name(), channel = %tap.name(), "tap closed");
          self.taps.remove(i);
        }
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }

  /// Sends on edge `e`, dropping channels whose consumer closed. Returns true if the edge
  /// lost its last channel and was removed; the row was then not delivered.
  async fn send_on_edge(
    &mut self,
    e: usize,
    row: &Row,
    schema: Option<&Schema>,
  ) -> Result<bool, StepError> {
    let edge = &mut self.outputs[e];
    let copy_to_all = edge.distribution == Distribution::CopyToAll;
    while !edge.channels.is_empty() {
      let targets = edge.pick(row, schema)?;
      let mut delivered = false;
      let mut closed = Vec::new();
      for idx in targets {
        let channel = edge.channels[idx].clone();
        if let Some(s) = schema {
          channel.set_schema(s);
        }
        match put_cancellable(&self.cancel, &channel, row.clone()).await {
          Ok(()) => delivered = true,
          Err(err) if is_closed(&err) => closed.push(idx),
          Err(err) => return Err(err),
        }
      }
      for idx in closed.into_iter().rev() {
        let channel = edge.channels.remove(idx);
        debug!(step = %self.ctx.step_name(), channel = %channel.name(), "output consumer closed");
      }
      if delivered || copy_to_all {
        break;
      }
    }
    if edge.channels.is_empty() {
      let edge = self.outputs.remove(e);
      debug!(step = %self.ctx.step_name(), target = %edge.target, "all consumers of edge closed");
      self.closed_targets.insert(edge.target);
      return Ok(true);
    }
    Ok(false)
  }

  /// Routes a rejected row with its cause to the error output. Without an error output the
  /// rejection is fatal. A full error channel is fatal once the configured wait runs out.
  pub async fn put_error(&mut self, row: Row, cause: RowErrorCause) -> Result<(), StepError> {
    let Some(edge) = self.error_output.as_mut() else {
      return Err(StepError::RowRejected(cause));
    };
    let schema = self
      .input_schema
      .as_ref()
      .or(self.output_schema.as_ref())
      .map(|s| s.extended(&error_fields()));
    let error_row = row.extended(cause.to_values());
    let targets = edge.pick(&error_row, schema.as_ref())?;
    for idx in targets {
      let channel = edge.channels[idx].clone();
      if let Some(s) = &schema {
        channel.set_schema(s);
      }
      if self.error_put_timeout.is_zero() {
        channel.try_put(error_row.clone())?;
      } else {
        let put = put_cancellable(&self.cancel, &channel, error_row.clone());
        match tokio::time::timeout(self.error_put_timeout, put).await {
          Ok(r) => r?,
          Err(_) => return Err(ChannelError::Full(channel.name().to_string()).into()),
        }
      }
    }
    self.counters.add_rejected(1);
    trace!(step = %self.ctx.step_name(), cause = %cause, "row routed to error output");
    Ok(())
  }

  /// Marks every output done; downstream drains and then sees end of stream.
  pub(crate) fn set_output_done(&self) {
    for channel in self.output_channels() {
      channel.set_done();
    }
  }

  /// Marks every output done with the upstream-failed flag.
  pub(crate) fn set_output_failed(&self) {
    for channel in self.output_channels() {
      channel.set_done_with_error();
    }
  }

  /// Tears down the consumer side of every remaining input, waking blocked producers.
  pub(crate) fn close_inputs(&mut self) {
    for input in self.inputs.drain(..) {
      input.channel.close_consumer();
    }
  }
}
