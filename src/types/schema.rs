//! Row schema: ordered field descriptors shared by every row on a channel.

use super::{Row, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
  pub name: String,
  #[serde(rename = "type")]
  pub value_type: ValueType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub length: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub precision: Option<u32>,
}

impl FieldMeta {
  pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
    Self {
      name: name.into(),
      value_type,
      length: None,
      precision: None,
    }
  }

  pub fn with_length(mut self, length: u32, precision: Option<u32>) -> Self {
    self.length = Some(length);
    self.precision = precision;
    self
  }
}

/// Parses `name:type`.
impl FromStr for FieldMeta {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (name, ty) = s
      .split_once(':')
      .ok_or_else(|| format!("expected name:type, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
      return Err(format!("empty field name in '{}'", s));
    }
    Ok(FieldMeta::new(name, ty.parse()?))
  }
}

/// Ordered list of field descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
  fields: Vec<FieldMeta>,
}

impl Schema {
  pub fn new(fields: Vec<FieldMeta>) -> Self {
    Self { fields }
  }

  pub fn empty() -> Self {
    Self::default()
  }

  pub fn with_field(mut self, field: FieldMeta) -> Self {
    self.fields.push(field);
    self
  }

  pub fn fields(&self) -> &[FieldMeta] {
    &self.fields
  }

  pub fn field(&self, index: usize) -> Option<&FieldMeta> {
    self.fields.get(index)
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.fields.iter().position(|f| f.name == name)
  }

  /// Resolves field names to positions, failing on the first unknown name.
  pub fn indexes_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, String> {
    names
      .iter()
      .map(|n| {
        self
          .index_of(n.as_ref())
          .ok_or_else(|| format!("field '{}' not in schema {}", n.as_ref(), self))
      })
      .collect()
  }

  /// Same arity and positionally equal types. Names, lengths and precisions are ignored.
  pub fn is_compatible(&self, other: &Schema) -> bool {
    self.fields.len() == other.fields.len()
      && self
        .fields
        .iter()
        .zip(other.fields.iter())
        .all(|(a, b)| a.value_type == b.value_type)
  }

  /// New schema with `other`'s fields appended.
  pub fn extended(&self, other: &[FieldMeta]) -> Schema {
    let mut fields = self.fields.clone();
    fields.extend_from_slice(other);
    Schema { fields }
  }

  /// Checks arity and per-field types of `row`. `Null` fits every type.
  pub fn check_row(&self, row: &Row) -> Result<(), String> {
    if row.len() != self.fields.len() {
      return Err(format!(
        "row has {} values, schema {} has {} fields",
        row.len(),
        self,
        self.fields.len()
      ));
    }
    for (field, value) in self.fields.iter().zip(row.values()) {
      if !value.fits(field.value_type) {
        return Err(format!(
          "field '{}' is {} but value is {:?}",
          field.name, field.value_type, value
        ));
      }
    }
    Ok(())
  }

  /// Parses a comma separated `name:type` list.
  pub fn parse_list(s: &str) -> Result<Schema, String> {
    s.split(',')
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .map(FieldMeta::from_str)
      .collect::<Result<Vec<_>, _>>()
      .map(Schema::new)
  }
}

impl fmt::Display for Schema {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[")?;
    for (i, field) in self.fields.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}:{}", field.name, field.value_type)?;
    }
    write!(f, "]")
  }
}
