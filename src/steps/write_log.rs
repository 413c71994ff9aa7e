//! Logs every row through `tracing` and passes it on.

use crate::error::StepError;
use crate::step::{Step, StepContext, decode_config};
use crate::step_io::StepIo;
use crate::types::{NodeRecord, Row, Schema};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteLogConfig {
  /// Prefix of every logged line.
  #[serde(default)]
  pub header: Option<String>,
  /// Log only the first `limit` rows; the rest pass through silently.
  #[serde(default)]
  pub limit: Option<u64>,
}

pub struct WriteLogStep {
  config: WriteLogConfig,
  logged: u64,
}

impl WriteLogStep {
  pub const TYPE: &'static str = "write_log";

  pub fn from_node(node: &NodeRecord) -> Result<Self, StepError> {
    Ok(Self::new(decode_config(node)?))
  }

  pub fn new(config: WriteLogConfig) -> Self {
    Self { config, logged: 0 }
  }

  pub fn logged(&self) -> u64 {
    self.logged
  }
}

fn render(row: &Row, schema: Option<&Schema>) -> String {
  match schema {
    Some(schema) if schema.len() == row.len() => schema
      .fields()
      .iter()
      .zip(row.values())
      .map(|(f, v)| format!("{}={}", f.name, v))
      .collect::<Vec<_>>()
      .join(", "),
    _ => row.to_string(),
  }
}

#[async_trait]
impl Step for WriteLogStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    let Some(row) = io.get_row().await? else {
      return Ok(false);
    };
    if self.config.limit.is_none_or(|limit| self.logged < limit) {
      let line = render(&row, io.input_schema());
      let header = self.config.header.as_deref().unwrap_or("row");
      info!(step = %io.context().step_name(), copy = io.context().copy(), "{}: {}", header, line);
      self.logged += 1;
    }
    io.put_row(row).await?;
    Ok(true)
  }

  async fn dispose(&mut self, ctx: &StepContext) {
    debug!(step = %ctx.step_name(), logged = self.logged, "write_log done");
  }
}
