//! Bounded row channel between one producing worker output and one consuming worker input.
//!
//! The producer blocks in [`RowChannel::put`] while the queue holds `capacity` rows; the
//! consumer blocks in [`RowChannel::get`] while the queue is empty and the channel is not
//! done. End of stream is the `done` flag plus an empty queue, never a sentinel row.
//!
//! Waiters register with a [`Notify`] before checking the queue under the lock, so a
//! wake-up between the check and the await is never lost.

use crate::error::ChannelError;
use crate::types::{Row, RowErrorCause, Schema};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::trace;

/// Result of a non-blocking read.
#[derive(Debug, Clone, PartialEq)]
pub enum TryGet {
  Row(Row),
  Empty,
  EndOfStream,
}

#[derive(Debug, Default)]
struct State {
  queue: VecDeque<Row>,
  /// Set once by the producer (or by safe stop on an entry channel).
  done: bool,
  /// Set together with `done` when the producer ended in ERROR.
  upstream_failed: bool,
  /// Entry channel closed for new rows by safe stop; queued rows still drain.
  stopped_accepting: bool,
  /// Consumer side torn down; queued rows were discarded.
  consumer_closed: bool,
}

impl State {
  fn at_end(&self) -> bool {
    self.done || self.stopped_accepting || self.consumer_closed
  }
}

pub struct RowChannel {
  name: String,
  capacity: usize,
  schema: OnceLock<Schema>,
  state: Mutex<State>,
  readable: Notify,
  writable: Notify,
  rows_accepted: AtomicU64,
  rows_delivered: AtomicU64,
}

impl RowChannel {
  /// `capacity` is clamped to at least one row.
  pub fn new(name: impl Into<String>, capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      name: name.into(),
      capacity,
      schema: OnceLock::new(),
      state: Mutex::new(State {
        queue: VecDeque::with_capacity(capacity.min(1024)),
        ..State::default()
      }),
      readable: Notify::new(),
      writable: Notify::new(),
      rows_accepted: AtomicU64::new(0),
      rows_delivered: AtomicU64::new(0),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Rows currently queued.
  pub fn len(&self) -> usize {
    self.state.lock().queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// True once no further rows can arrive.
  pub fn is_done(&self) -> bool {
    self.state.lock().at_end()
  }

  pub fn upstream_failed(&self) -> bool {
    self.state.lock().upstream_failed
  }

  pub fn is_consumer_closed(&self) -> bool {
    self.state.lock().consumer_closed
  }

  pub fn rows_accepted(&self) -> u64 {
    self.rows_accepted.load(Ordering::Relaxed)
  }

  pub fn rows_delivered(&self) -> u64 {
    self.rows_delivered.load(Ordering::Relaxed)
  }

  /// Schema of the rows on this channel, fixed by the first call to [`Self::set_schema`].
  pub fn schema(&self) -> Option<&Schema> {
    self.schema.get()
  }

  /// Attaches the schema once; later calls are ignored.
  pub fn set_schema(&self, schema: &Schema) {
    if self.schema.get().is_none() {
      let _ = self.schema.set(schema.clone());
    }
  }

  /// Future completing on the next row or end-of-stream wake-up. Used by fan-in to wait on
  /// several channels at once; callers must re-check with [`Self::try_get`].
  pub fn readable(&self) -> Notified<'_> {
    self.readable.notified()
  }

  fn put_closed_error(&self, state: &State) -> Option<ChannelError> {
    if state.done || state.consumer_closed || state.stopped_accepting {
      Some(ChannelError::Closed(self.name.clone()))
    } else {
      None
    }
  }

  /// Appends a row, waiting while the channel is full.
  pub async fn put(&self, row: Row) -> Result<(), ChannelError> {
    loop {
      let writable = self.writable.notified();
      tokio::pin!(writable);
      writable.as_mut().enable();
      {
        let mut state = self.state.lock();
        if let Some(err) = self.put_closed_error(&state) {
          return Err(err);
        }
        if state.queue.len() < self.capacity {
          state.queue.push_back(row);
          drop(state);
          self.rows_accepted.fetch_add(1, Ordering::Relaxed);
          self.readable.notify_one();
          return Ok(());
        }
      }
      trace!(channel = %self.name, "channel full, producer waiting");
      writable.await;
    }
  }

  /// Appends a row if there is room.
  pub fn try_put(&self, row: Row) -> Result<(), ChannelError> {
    let mut state = self.state.lock();
    if let Some(err) = self.put_closed_error(&state) {
      return Err(err);
    }
    if state.queue.len() >= self.capacity {
      return Err(ChannelError::Full(self.name.clone()));
    }
    state.queue.push_back(row);
    drop(state);
    self.rows_accepted.fetch_add(1, Ordering::Relaxed);
    self.readable.notify_one();
    Ok(())
  }

  /// Queues `row` extended with the error fields of `cause`. Never waits: a full channel
  /// returns [`ChannelError::Full`], which the producing worker treats as fatal.
  pub fn put_error(&self, row: &Row, cause: &RowErrorCause) -> Result<(), ChannelError> {
    self.try_put(row.extended(cause.to_values()))
  }

  /// Takes the next row, waiting while the queue is empty and the channel is not done.
  /// Returns `None` at end of stream.
  pub async fn get(&self) -> Option<Row> {
    loop {
      let readable = self.readable.notified();
      tokio::pin!(readable);
      readable.as_mut().enable();
      match self.try_get() {
        TryGet::Row(row) => return Some(row),
        TryGet::EndOfStream => return None,
        TryGet::Empty => {}
      }
      readable.await;
    }
  }

  pub fn try_get(&self) -> TryGet {
    let mut state = self.state.lock();
    if let Some(row) = state.queue.pop_front() {
      drop(state);
      self.rows_delivered.fetch_add(1, Ordering::Relaxed);
      self.writable.notify_one();
      return TryGet::Row(row);
    }
    if state.at_end() {
      TryGet::EndOfStream
    } else {
      TryGet::Empty
    }
  }

  /// Marks the end of stream. Idempotent; queued rows still drain.
  pub fn set_done(&self) {
    self.finish(false);
  }

  /// End of stream carrying the upstream-failed flag.
  pub fn set_done_with_error(&self) {
    self.finish(true);
  }

  fn finish(&self, failed: bool) {
    {
      let mut state = self.state.lock();
      if state.done {
        return;
      }
      state.done = true;
      state.upstream_failed = failed;
    }
    trace!(channel = %self.name, failed, "channel done");
    self.readable.notify_waiters();
    self.writable.notify_waiters();
  }

  /// Consumer-side end of acceptance for externally fed channels: further puts fail, queued
  /// rows still drain, then the consumer sees end of stream.
  pub fn stop_accepting(&self) {
    {
      let mut state = self.state.lock();
      if state.stopped_accepting {
        return;
      }
      state.stopped_accepting = true;
    }
    trace!(channel = %self.name, "channel stopped accepting");
    self.readable.notify_waiters();
    self.writable.notify_waiters();
  }

  /// Consumer teardown: discards queued rows and wakes a blocked producer, whose put then
  /// fails with [`ChannelError::Closed`].
  pub fn close_consumer(&self) {
    {
      let mut state = self.state.lock();
      if state.consumer_closed {
        return;
      }
      state.consumer_closed = true;
      state.queue.clear();
    }
    trace!(channel = %self.name, "channel consumer closed");
    self.writable.notify_waiters();
    self.readable.notify_waiters();
  }
}

impl fmt::Debug for RowChannel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("RowChannel")
      .field("name", &self.name)
      .field("capacity", &self.capacity)
      .field("len", &state.queue.len())
      .field("done", &state.done)
      .field("upstream_failed", &state.upstream_failed)
      .field("stopped_accepting", &state.stopped_accepting)
      .field("consumer_closed", &state.consumer_closed)
      .finish()
  }
}
