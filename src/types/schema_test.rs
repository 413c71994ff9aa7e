//! Tests for `Schema` and `FieldMeta`.

use super::{FieldMeta, Row, Schema, Value, ValueType};

fn id_name() -> Schema {
  Schema::empty()
    .with_field(FieldMeta::new("id", ValueType::Integer))
    .with_field(FieldMeta::new("name", ValueType::String))
}

#[test]
fn compatible_ignores_names() {
  let other = Schema::parse_list("key:integer, label:string").unwrap();
  assert!(id_name().is_compatible(&other));
}

#[test]
fn incompatible_on_arity_or_type() {
  let shorter = Schema::parse_list("id:integer").unwrap();
  let swapped = Schema::parse_list("name:string,id:integer").unwrap();
  assert!(!id_name().is_compatible(&shorter));
  assert!(!id_name().is_compatible(&swapped));
}

#[test]
fn index_lookup() {
  let s = id_name();
  assert_eq!(s.index_of("name"), Some(1));
  assert_eq!(s.indexes_of(&["name", "id"]).unwrap(), vec![1, 0]);
  assert!(s.indexes_of(&["missing"]).is_err());
}

#[test]
fn check_row_validates_arity_and_types() {
  let s = id_name();
  assert!(s.check_row(&Row::new(vec![Value::Integer(1), Value::from("a")])).is_ok());
  assert!(s.check_row(&Row::new(vec![Value::Null, Value::Null])).is_ok());
  assert!(s.check_row(&Row::new(vec![Value::Integer(1)])).is_err());
  assert!(s.check_row(&Row::new(vec![Value::from("a"), Value::from("b")])).is_err());
}

#[test]
fn extended_appends_fields() {
  let s = id_name().extended(&[FieldMeta::new("tk", ValueType::Integer)]);
  assert_eq!(s.len(), 3);
  assert_eq!(s.to_string(), "[id:integer, name:string, tk:integer]");
}

#[test]
fn parse_list_rejects_malformed() {
  assert!(Schema::parse_list("id").is_err());
  assert!(Schema::parse_list(":integer").is_err());
  assert!(Schema::parse_list("id:whatever").is_err());
  assert!(Schema::parse_list("").unwrap().is_empty());
}

#[test]
fn serde_uses_field_list() {
  let json = serde_json::to_value(id_name()).unwrap();
  assert_eq!(json[0]["name"], "id");
  assert_eq!(json[0]["type"], "integer");
  let back: Schema = serde_json::from_value(json).unwrap();
  assert_eq!(back, id_name());
}
