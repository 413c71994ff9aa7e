//! Source step emitting rows built from constant fields plus an optional sequence.

use crate::error::StepError;
use crate::step::{Step, decode_config};
use crate::step_io::StepIo;
use crate::types::{FieldMeta, NodeRecord, Row, Schema, Value, ValueType};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Rows between cooperative yields of an unbounded generator.
const YIELD_EVERY: u64 = 256;

fn one() -> i64 {
  1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedField {
  pub name: String,
  #[serde(rename = "type")]
  pub value_type: ValueType,
  /// JSON literal converted to `value_type`; absent means null.
  #[serde(default)]
  pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRowsConfig {
  /// Rows to emit per copy. Absent: run until the pipeline is stopped.
  #[serde(default)]
  pub limit: Option<u64>,
  #[serde(default)]
  pub fields: Vec<GeneratedField>,
  /// Integer field appended after `fields`, counting from `sequence_start`.
  #[serde(default)]
  pub sequence_field: Option<String>,
  #[serde(default = "one")]
  pub sequence_start: i64,
  /// Pause between rows.
  #[serde(default)]
  pub interval_ms: u64,
}

pub struct GenerateRowsStep {
  limit: Option<u64>,
  interval: Duration,
  has_sequence: bool,
  sequence_start: i64,
  schema: Schema,
  template: Vec<Value>,
  emitted: u64,
}

impl GenerateRowsStep {
  pub const TYPE: &'static str = "generate_rows";

  pub fn from_node(node: &NodeRecord) -> Result<Self, StepError> {
    Self::new(decode_config(node)?)
  }

  pub fn new(config: GenerateRowsConfig) -> Result<Self, StepError> {
    let mut schema = Schema::empty();
    let mut template = Vec::with_capacity(config.fields.len());
    for field in &config.fields {
      let value = Value::from_json(&field.value, field.value_type)
        .map_err(|e| StepError::config(format!("field '{}': {}", field.name, e)))?;
      schema = schema.with_field(FieldMeta::new(&field.name, field.value_type));
      template.push(value);
    }
    if let Some(name) = &config.sequence_field {
      if schema.index_of(name).is_some() {
        return Err(StepError::config(format!(
          "sequence field '{}' duplicates a constant field",
          name
        )));
      }
      schema = schema.with_field(FieldMeta::new(name, ValueType::Integer));
    }
    Ok(Self {
      limit: config.limit,
      interval: Duration::from_millis(config.interval_ms),
      has_sequence: config.sequence_field.is_some(),
      sequence_start: config.sequence_start,
      schema,
      template,
      emitted: 0,
    })
  }

  pub fn schema(&self) -> &Schema {
    &self.schema
  }
}

#[async_trait]
impl Step for GenerateRowsStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    if self.limit.is_some_and(|limit| self.emitted >= limit) {
      debug!(step = %io.context().step_name(), rows = self.emitted, "row limit reached");
      return Ok(false);
    }
    if self.emitted == 0 {
      io.set_output_schema(self.schema.clone());
    } else if !self.interval.is_zero() {
      io.sleep(self.interval).await?;
    } else if self.limit.is_none() && self.emitted % YIELD_EVERY == 0 {
      tokio::task::yield_now().await;
    }
    let mut values = self.template.clone();
    if self.has_sequence {
      values.push(Value::Integer(self.sequence_start + self.emitted as i64));
    }
    io.put_row(Row::new(values)).await?;
    self.emitted += 1;
    Ok(true)
  }
}
