//! Steps and graph builders shared by the unit tests.

use crate::error::StepError;
use crate::step::{Step, StepContext, StepRegistry, decode_config};
use crate::step_io::StepIo;
use crate::types::{EdgeRecord, GraphDescription, NodeRecord, Row, RowErrorCause, Value};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts lifecycle calls across every probe step of a pipeline.
#[derive(Default)]
pub(crate) struct Probe {
  pub(crate) inits: AtomicUsize,
  pub(crate) iterations: AtomicUsize,
  pub(crate) disposes: AtomicUsize,
}

impl Probe {
  pub(crate) fn inits(&self) -> usize {
    self.inits.load(Ordering::SeqCst)
  }

  pub(crate) fn iterations(&self) -> usize {
    self.iterations.load(Ordering::SeqCst)
  }

  pub(crate) fn disposes(&self) -> usize {
    self.disposes.load(Ordering::SeqCst)
  }
}

/// Pass-through step recording its lifecycle; optionally fails init.
pub(crate) struct ProbeStep {
  probe: Arc<Probe>,
  fail_init: bool,
}

#[async_trait]
impl Step for ProbeStep {
  async fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
    self.probe.inits.fetch_add(1, Ordering::SeqCst);
    if self.fail_init {
      return Err(StepError::config("probe refused to start"));
    }
    Ok(())
  }

  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    self.probe.iterations.fetch_add(1, Ordering::SeqCst);
    match io.get_row().await? {
      Some(row) => {
        io.put_row(row).await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn dispose(&mut self, _ctx: &StepContext) {
    self.probe.disposes.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Deserialize)]
struct FailOnRowConfig {
  fail_at: u64,
}

/// Pass-through step that fails on its `fail_at`-th row (1-based).
pub(crate) struct FailOnRowStep {
  fail_at: u64,
  seen: u64,
}

#[async_trait]
impl Step for FailOnRowStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    let Some(row) = io.get_row().await? else {
      return Ok(false);
    };
    self.seen += 1;
    if self.seen == self.fail_at {
      return Err(StepError::failed(format!("boom at row {}", self.seen)));
    }
    io.put_row(row).await?;
    Ok(true)
  }
}

/// Routes rows whose first value is an odd integer to the error output.
pub(crate) struct RejectOddStep;

#[async_trait]
impl Step for RejectOddStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    let Some(row) = io.get_row().await? else {
      return Ok(false);
    };
    match row.get(0).and_then(Value::as_integer) {
      Some(n) if n % 2 != 0 => {
        let cause = RowErrorCause::new(format!("{} is odd", n))
          .with_fields("id")
          .with_code("ODD");
        io.put_error(row, cause).await?;
      }
      _ => io.put_row(row).await?,
    }
    Ok(true)
  }
}

/// Built-in steps plus `probe`, `probe_fail_init`, `fail_on_row` and `reject_odd`.
pub(crate) fn test_registry(probe: Arc<Probe>) -> StepRegistry {
  let mut registry = StepRegistry::with_builtin();
  let p = probe.clone();
  registry.register("probe", move |_| {
    Ok(Box::new(ProbeStep {
      probe: p.clone(),
      fail_init: false,
    }) as Box<dyn Step>)
  });
  registry.register("probe_fail_init", move |_| {
    Ok(Box::new(ProbeStep {
      probe: probe.clone(),
      fail_init: true,
    }) as Box<dyn Step>)
  });
  registry.register("fail_on_row", |node| {
    let config: FailOnRowConfig = decode_config(node)?;
    Ok(Box::new(FailOnRowStep {
      fail_at: config.fail_at,
      seen: 0,
    }) as Box<dyn Step>)
  });
  registry.register("reject_odd", |_| Ok(Box::new(RejectOddStep) as Box<dyn Step>));
  registry
}

/// `generate_rows` node emitting `limit` rows with an integer `id` sequence from 1.
/// `None` generates until stopped.
pub(crate) fn generator(id: &str, limit: Option<u64>) -> NodeRecord {
  let mut config = json!({ "sequence_field": "id" });
  if let Some(limit) = limit {
    config["limit"] = json!(limit);
  }
  NodeRecord::new(id, "generate_rows").with_config(config)
}

/// `names[0] -> names[1] -> ...` with the given node types.
pub(crate) fn chain(name: &str, nodes: Vec<NodeRecord>) -> GraphDescription {
  let mut desc = GraphDescription::new(name);
  for pair in nodes.windows(2) {
    desc = desc.with_edge(EdgeRecord::new(&pair[0].id, &pair[1].id));
  }
  for node in nodes {
    desc = desc.with_node(node);
  }
  desc
}

pub(crate) fn ids(rows: &[Row]) -> Vec<i64> {
  rows
    .iter()
    .filter_map(|r| r.get(0).and_then(Value::as_integer))
    .collect()
}
