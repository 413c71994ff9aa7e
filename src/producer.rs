//! Injecting rows into a running pipeline from outside it.

use crate::channel::RowChannel;
use crate::error::ChannelError;
use crate::types::{Row, Schema};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Writer side of an extra input channel of one step copy, created by
/// [`crate::Pipeline::add_row_producer`] before start.
///
/// [`RowProducer::finished`] marks the end of the injected stream; dropping the producer
/// does the same. Safe stop closes the channel for new rows; rows already queued drain.
pub struct RowProducer {
  step: String,
  copy: usize,
  channel: Arc<RowChannel>,
  cancel: CancellationToken,
}

impl RowProducer {
  pub(crate) fn new(
    step: impl Into<String>,
    copy: usize,
    channel: Arc<RowChannel>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      step: step.into(),
      copy,
      channel,
      cancel,
    }
  }

  pub fn step_name(&self) -> &str {
    &self.step
  }

  pub fn copy(&self) -> usize {
    self.copy
  }

  /// Schema of the injected rows; only the first call has an effect.
  pub fn set_schema(&self, schema: &Schema) {
    self.channel.set_schema(schema);
  }

  /// Rows waiting to be read by the step.
  pub fn buffered(&self) -> usize {
    self.channel.len()
  }

  /// Queues a row, waiting while the channel is full. Fails once the pipeline stopped or
  /// the channel stopped accepting rows.
  pub async fn put_row(&self, row: Row) -> Result<(), ChannelError> {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(ChannelError::Closed(self.channel.name().to_string())),
      r = self.channel.put(row) => r,
    }
  }

  /// Like [`Self::put_row`] but gives up after `timeout`; returns `Ok(false)` if the row was
  /// not queued in time.
  pub async fn put_row_wait(&self, row: Row, timeout: Duration) -> Result<bool, ChannelError> {
    match tokio::time::timeout(timeout, self.put_row(row)).await {
      Ok(r) => r.map(|()| true),
      Err(_) => Ok(false),
    }
  }

  /// Signals that no more rows will be injected.
  pub fn finished(&self) {
    debug!(step = %self.step, copy = self.copy, "row producer finished");
    self.channel.set_done();
  }
}

impl Drop for RowProducer {
  fn drop(&mut self) {
    self.channel.set_done();
  }
}
