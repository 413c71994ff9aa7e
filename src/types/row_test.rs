//! Tests for `Row` and `RowErrorCause`.

use super::{Row, RowErrorCause, Value, error_fields};

#[test]
fn empty_row_is_a_row() {
  let r = Row::empty();
  assert!(r.is_empty());
  assert_eq!(r.to_string(), "[]");
}

#[test]
fn extended_keeps_original() {
  let r = Row::new(vec![Value::Integer(1)]);
  let e = r.extended([Value::from("x")]);
  assert_eq!(r.len(), 1);
  assert_eq!(e.len(), 2);
  assert_eq!(e.get(1), Some(&Value::from("x")));
}

#[test]
fn display_joins_values() {
  let r = Row::from(vec![Value::Integer(1), Value::Null, Value::from("a")]);
  assert_eq!(r.to_string(), "[1, null, a]");
}

#[test]
fn error_cause_values_match_error_fields() {
  let cause = RowErrorCause::new("bad key")
    .with_fields("id")
    .with_code("E1");
  let values = cause.to_values();
  let fields = error_fields();
  assert_eq!(values.len(), fields.len());
  for (v, f) in values.iter().zip(fields.iter()) {
    assert!(v.fits(f.value_type));
  }
  assert_eq!(values[0], Value::Integer(1));
  assert_eq!(cause.to_string(), "E1: bad key");
}
