//! Cause attached to a rejected row on its way to an error output.

use super::{FieldMeta, Value, ValueType};
use std::fmt;

/// Names of the fields appended to a rejected row.
pub const ERROR_COUNT_FIELD: &str = "error_count";
pub const ERROR_DESCRIPTIONS_FIELD: &str = "error_descriptions";
pub const ERROR_FIELDS_FIELD: &str = "error_fields";
pub const ERROR_CODES_FIELD: &str = "error_codes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowErrorCause {
  pub count: i64,
  pub description: String,
  pub fields: String,
  pub code: String,
}

impl RowErrorCause {
  pub fn new(description: impl Into<String>) -> Self {
    Self {
      count: 1,
      description: description.into(),
      fields: String::new(),
      code: String::new(),
    }
  }

  pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
    self.fields = fields.into();
    self
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = code.into();
    self
  }

  pub fn with_count(mut self, count: i64) -> Self {
    self.count = count;
    self
  }

  /// Values appended to the rejected row, in [`error_fields`] order.
  pub fn to_values(&self) -> [Value; 4] {
    [
      Value::Integer(self.count),
      Value::String(self.description.clone()),
      Value::String(self.fields.clone()),
      Value::String(self.code.clone()),
    ]
  }
}

impl fmt::Display for RowErrorCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.code.is_empty() {
      write!(f, "{}", self.description)
    } else {
      write!(f, "{}: {}", self.code, self.description)
    }
  }
}

pub fn error_fields() -> [FieldMeta; 4] {
  [
    FieldMeta::new(ERROR_COUNT_FIELD, ValueType::Integer),
    FieldMeta::new(ERROR_DESCRIPTIONS_FIELD, ValueType::String),
    FieldMeta::new(ERROR_FIELDS_FIELD, ValueType::String),
    FieldMeta::new(ERROR_CODES_FIELD, ValueType::String),
  ]
}
