//! Row: fixed-arity sequence of values. The schema lives on the channel, not the row.

use super::Value;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
  values: Vec<Value>,
}

impl Row {
  pub fn new(values: Vec<Value>) -> Self {
    Self { values }
  }

  /// A row with no values. Still a row: it is counted and delivered like any other.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Value> {
    self.values.get(index)
  }

  pub fn values(&self) -> &[Value] {
    &self.values
  }

  pub fn into_values(self) -> Vec<Value> {
    self.values
  }

  pub fn with_value(mut self, value: Value) -> Self {
    self.values.push(value);
    self
  }

  /// Copy of this row with `extra` appended.
  pub fn extended<I: IntoIterator<Item = Value>>(&self, extra: I) -> Row {
    let mut values = self.values.clone();
    values.extend(extra);
    Row { values }
  }
}

impl From<Vec<Value>> for Row {
  fn from(values: Vec<Value>) -> Self {
    Row::new(values)
  }
}

impl fmt::Display for Row {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[")?;
    for (i, v) in self.values.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", v)?;
    }
    write!(f, "]")
  }
}
