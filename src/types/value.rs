//! Typed field values carried by rows.

use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
  Boolean,
  Integer,
  Number,
  Decimal,
  String,
  Date,
  Binary,
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValueType::Boolean => write!(f, "boolean"),
      ValueType::Integer => write!(f, "integer"),
      ValueType::Number => write!(f, "number"),
      ValueType::Decimal => write!(f, "decimal"),
      ValueType::String => write!(f, "string"),
      ValueType::Date => write!(f, "date"),
      ValueType::Binary => write!(f, "binary"),
    }
  }
}

impl FromStr for ValueType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "boolean" | "bool" => Ok(ValueType::Boolean),
      "integer" | "int" => Ok(ValueType::Integer),
      "number" | "float" => Ok(ValueType::Number),
      "decimal" | "bignumber" => Ok(ValueType::Decimal),
      "string" => Ok(ValueType::String),
      "date" => Ok(ValueType::Date),
      "binary" => Ok(ValueType::Binary),
      other => Err(format!("unknown value type '{}'", other)),
    }
  }
}

/// One field value. `Null` is valid for every declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Boolean(bool),
  Integer(i64),
  Number(f64),
  Decimal(BigDecimal),
  String(String),
  Date(DateTime<Utc>),
  Binary(Bytes),
}

impl Value {
  /// Type of the value, `None` for `Null`.
  pub fn value_type(&self) -> Option<ValueType> {
    match self {
      Value::Null => None,
      Value::Boolean(_) => Some(ValueType::Boolean),
      Value::Integer(_) => Some(ValueType::Integer),
      Value::Number(_) => Some(ValueType::Number),
      Value::Decimal(_) => Some(ValueType::Decimal),
      Value::String(_) => Some(ValueType::String),
      Value::Date(_) => Some(ValueType::Date),
      Value::Binary(_) => Some(ValueType::Binary),
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// True if this value may be stored in a field declared as `ty`.
  pub fn fits(&self, ty: ValueType) -> bool {
    self.value_type().is_none_or(|t| t == ty)
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Value::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  /// Converts a JSON literal from step configuration into a value of type `ty`.
  pub fn from_json(json: &serde_json::Value, ty: ValueType) -> Result<Value, String> {
    if json.is_null() {
      return Ok(Value::Null);
    }
    let mismatch = || format!("cannot convert {} to {}", json, ty);
    match ty {
      ValueType::Boolean => match json {
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
          "true" | "y" | "yes" => Ok(Value::Boolean(true)),
          "false" | "n" | "no" => Ok(Value::Boolean(false)),
          _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
      },
      ValueType::Integer => match json {
        serde_json::Value::Number(n) => n.as_i64().map(Value::Integer).ok_or_else(mismatch),
        serde_json::Value::String(s) => s.trim().parse().map(Value::Integer).map_err(|_| mismatch()),
        _ => Err(mismatch()),
      },
      ValueType::Number => match json {
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number).ok_or_else(mismatch),
        serde_json::Value::String(s) => s.trim().parse().map(Value::Number).map_err(|_| mismatch()),
        _ => Err(mismatch()),
      },
      ValueType::Decimal => {
        let text = match json {
          serde_json::Value::Number(n) => n.to_string(),
          serde_json::Value::String(s) => s.trim().to_string(),
          _ => return Err(mismatch()),
        };
        BigDecimal::from_str(&text)
          .map(Value::Decimal)
          .map_err(|_| mismatch())
      }
      ValueType::String => match json {
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        other => Ok(Value::String(other.to_string())),
      },
      ValueType::Date => match json {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
          .map(|d| Value::Date(d.with_timezone(&Utc)))
          .map_err(|_| mismatch()),
        serde_json::Value::Number(n) => n
          .as_i64()
          .and_then(DateTime::from_timestamp_millis)
          .map(Value::Date)
          .ok_or_else(mismatch),
        _ => Err(mismatch()),
      },
      ValueType::Binary => match json {
        serde_json::Value::String(s) => Ok(Value::Binary(Bytes::from(s.clone().into_bytes()))),
        serde_json::Value::Array(items) => items
          .iter()
          .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
          .collect::<Option<Vec<u8>>>()
          .map(|b| Value::Binary(Bytes::from(b)))
          .ok_or_else(mismatch),
        _ => Err(mismatch()),
      },
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Boolean(b) => write!(f, "{}", b),
      Value::Integer(i) => write!(f, "{}", i),
      Value::Number(n) => write!(f, "{}", n),
      Value::Decimal(d) => write!(f, "{}", d),
      Value::String(s) => write!(f, "{}", s),
      Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
      Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
    }
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Integer(v)
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self {
    Value::Number(v)
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Boolean(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::String(v.to_string())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::String(v)
  }
}
