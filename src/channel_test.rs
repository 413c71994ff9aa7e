//! Tests for `RowChannel`.

use crate::channel::{RowChannel, TryGet};
use crate::error::ChannelError;
use crate::types::{Row, RowErrorCause, Schema, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready, task};

fn row(i: i64) -> Row {
  Row::new(vec![Value::Integer(i)])
}

#[tokio::test]
async fn put_blocks_when_full() {
  let ch = RowChannel::new("a -> b", 2);
  ch.put(row(1)).await.unwrap();
  ch.put(row(2)).await.unwrap();
  assert_eq!(ch.len(), 2);

  let mut blocked = task::spawn(ch.put(row(3)));
  assert_pending!(blocked.poll());
  assert_eq!(ch.len(), 2);

  assert_eq!(ch.try_get(), TryGet::Row(row(1)));
  assert!(blocked.is_woken());
  assert_ready!(blocked.poll()).unwrap();
  assert_eq!(ch.len(), 2);
}

#[tokio::test]
async fn size_never_exceeds_capacity_under_concurrency() {
  let ch = Arc::new(RowChannel::new("cap", 3));
  let producer = {
    let ch = ch.clone();
    tokio::spawn(async move {
      for i in 0..200 {
        ch.put(row(i)).await.unwrap();
        assert!(ch.len() <= 3);
      }
      ch.set_done();
    })
  };
  let mut seen = Vec::new();
  while let Some(r) = ch.get().await {
    assert!(ch.len() <= 3);
    seen.push(r.get(0).and_then(Value::as_integer).unwrap());
  }
  producer.await.unwrap();
  assert_eq!(seen, (0..200).collect::<Vec<_>>());
  assert_eq!(ch.rows_accepted(), 200);
  assert_eq!(ch.rows_delivered(), 200);
}

#[tokio::test]
async fn get_drains_then_reports_end_of_stream() {
  let ch = RowChannel::new("eos", 10);
  for i in 0..3 {
    ch.put(row(i)).await.unwrap();
  }
  ch.set_done();
  for i in 0..3 {
    assert_eq!(ch.get().await, Some(row(i)));
  }
  assert_eq!(ch.get().await, None);
  assert_eq!(ch.get().await, None);
  assert_eq!(ch.rows_delivered(), 3);
}

#[tokio::test]
async fn get_blocks_while_empty_and_not_done() {
  let ch = RowChannel::new("wait", 4);
  let mut waiting = task::spawn(ch.get());
  assert_pending!(waiting.poll());
  ch.set_done();
  assert!(waiting.is_woken());
  assert_eq!(assert_ready!(waiting.poll()), None);
}

#[tokio::test]
async fn put_after_done_fails() {
  let ch = RowChannel::new("done", 4);
  ch.set_done();
  ch.set_done();
  assert_eq!(
    ch.put(row(1)).await,
    Err(ChannelError::Closed("done".to_string()))
  );
  assert!(ch.try_put(row(1)).is_err());
  assert_eq!(ch.rows_accepted(), 0);
}

#[tokio::test]
async fn close_consumer_wakes_blocked_producer() {
  let ch = Arc::new(RowChannel::new("closed", 1));
  ch.put(row(1)).await.unwrap();
  let producer = {
    let ch = ch.clone();
    tokio::spawn(async move { ch.put(row(2)).await })
  };
  tokio::time::sleep(Duration::from_millis(20)).await;
  ch.close_consumer();
  let r = tokio::time::timeout(Duration::from_secs(2), producer)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(r, Err(ChannelError::Closed("closed".to_string())));
  assert!(ch.is_empty());
  assert_eq!(ch.try_get(), TryGet::EndOfStream);
}

#[tokio::test]
async fn stop_accepting_drains_queued_rows() {
  let ch = RowChannel::new("entry", 4);
  ch.put(row(1)).await.unwrap();
  ch.stop_accepting();
  assert_eq!(
    ch.put(row(2)).await,
    Err(ChannelError::Closed("entry".to_string()))
  );
  assert_eq!(ch.get().await, Some(row(1)));
  assert_eq!(ch.get().await, None);
  assert!(!ch.upstream_failed());
}

#[tokio::test]
async fn done_with_error_sets_flag() {
  let ch = RowChannel::new("failed", 4);
  ch.put(row(1)).await.unwrap();
  ch.set_done_with_error();
  assert!(ch.upstream_failed());
  assert_eq!(ch.try_get(), TryGet::Row(row(1)));
  assert_eq!(ch.try_get(), TryGet::EndOfStream);
}

#[test]
fn try_get_on_open_empty_channel() {
  let ch = RowChannel::new("empty", 4);
  assert_eq!(ch.try_get(), TryGet::Empty);
  assert!(!ch.is_done());
}

#[test]
fn put_error_appends_cause_and_fails_when_full() {
  let ch = RowChannel::new("errors", 1);
  let cause = RowErrorCause::new("bad").with_code("E1");
  ch.put_error(&row(7), &cause).unwrap();
  assert_eq!(
    ch.put_error(&row(8), &cause),
    Err(ChannelError::Full("errors".to_string()))
  );
  match ch.try_get() {
    TryGet::Row(r) => {
      assert_eq!(r.len(), 5);
      assert_eq!(r.get(0), Some(&Value::Integer(7)));
      assert_eq!(r.get(2), Some(&Value::from("bad")));
      assert_eq!(r.get(4), Some(&Value::from("E1")));
    }
    other => panic!("expected a row, got {:?}", other),
  }
}

#[test]
fn schema_is_fixed_by_first_write() {
  let ch = RowChannel::new("schema", 1);
  assert!(ch.schema().is_none());
  ch.set_schema(&Schema::parse_list("id:integer").unwrap());
  ch.set_schema(&Schema::parse_list("name:string").unwrap());
  assert_eq!(ch.schema().unwrap().to_string(), "[id:integer]");
}

#[test]
fn zero_capacity_is_clamped() {
  assert_eq!(RowChannel::new("z", 0).capacity(), 1);
}
