//! Compile a [`GraphDescription`] into a runnable [`Pipeline`].
//!
//! One worker per node copy, one bounded channel per (producer copy, consumer copy) pair
//! of every edge. Edges between nodes with equal copy counts connect copy i to copy i,
//! except keyed edges; otherwise every producer copy connects to every consumer copy.

use crate::channel::RowChannel;
use crate::control::{PipelineControl, PipelineHandle};
use crate::error::GraphError;
use crate::pipeline::Pipeline;
use crate::resources::SharedResources;
use crate::step::{StepContext, StepRegistry};
use crate::step_io::{OutputEdge, StepIo};
use crate::types::{Distribution, GraphDescription, StepCounters};
use crate::validate::validate;
use crate::worker::StepWorker;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Consumer copies reached from producer copy `copy`. A keyed edge always reaches every
/// consumer copy so equal keys meet on one copy whichever producer copy emits them.
fn target_copies(
  copy: usize,
  from_copies: usize,
  to_copies: usize,
  distribution: &Distribution,
) -> Vec<usize> {
  if from_copies == to_copies && !matches!(distribution, Distribution::Keyed { .. }) {
    vec![copy]
  } else {
    (0..to_copies).collect()
  }
}

/// Validates `desc`, builds every step through `registry` and wires the channels. Nothing
/// runs until [`Pipeline::start`].
#[instrument(level = "trace", skip(desc, registry, resources), fields(pipeline = %desc.name))]
pub fn compile_pipeline(
  desc: &GraphDescription,
  registry: &StepRegistry,
  resources: &SharedResources,
) -> Result<Pipeline, GraphError> {
  info!("compiling pipeline");
  let config = desc.engine.clone();
  config.validate().map_err(GraphError::InvalidConfig)?;
  let order = validate(desc)?;
  for node in &desc.nodes {
    if !registry.contains(&node.step_type) {
      return Err(GraphError::UnknownStepType {
        node: node.id.clone(),
        step_type: node.step_type.clone(),
      });
    }
  }

  let control = PipelineControl::new(&desc.name, config.failure_policy);
  let handle = PipelineHandle::new(control.clone());

  let mut ios: HashMap<&str, Vec<(StepIo, Arc<StepCounters>)>> = HashMap::new();
  for node in &desc.nodes {
    let copies = (0..node.copies)
      .map(|copy| {
        let counters = Arc::new(StepCounters::new());
        let ctx = StepContext::new(node, copy, resources.clone(), handle.clone());
        let io = StepIo::new(
          ctx,
          control.cancel_token().clone(),
          counters.clone(),
          node.fan_out,
          config.safe_mode,
          config.error_put_timeout(),
        );
        (io, counters)
      })
      .collect();
    ios.insert(node.id.as_str(), copies);
  }

  let mut channel_count = 0;
  for edge in &desc.edges {
    let (Some(from), Some(to)) = (desc.node(&edge.from), desc.node(&edge.to)) else {
      continue;
    };
    let capacity = if edge.error {
      config.error_channel_capacity
    } else {
      config.channel_capacity
    };
    for i in 0..from.copies {
      let mut channels = Vec::new();
      for j in target_copies(i, from.copies, to.copies, &edge.distribution) {
        let channel = Arc::new(RowChannel::new(
          format!("{}.{} -> {}.{}", edge.from, i, edge.to, j),
          capacity,
        ));
        if let Some(consumer) = ios.get_mut(edge.to.as_str()).and_then(|c| c.get_mut(j)) {
          consumer.0.add_input(&edge.from, channel.clone());
        }
        channels.push(channel);
      }
      channel_count += channels.len();
      let out = OutputEdge::new(&edge.to, edge.distribution.clone(), channels);
      if let Some(producer) = ios.get_mut(edge.from.as_str()).and_then(|c| c.get_mut(i)) {
        if edge.error {
          producer.0.set_error_output(out);
        } else {
          producer.0.add_output(out);
        }
      }
    }
    debug!(from = %edge.from, to = %edge.to, error = edge.error, "edge wired");
  }

  let mut workers = Vec::new();
  for id in &order {
    let Some(node) = desc.node(id) else {
      continue;
    };
    for (io, counters) in ios.remove(id.as_str()).unwrap_or_default() {
      let step = registry.create(node)?;
      workers.push(StepWorker::new(step, io, counters, control.clone()));
    }
  }

  info!(
    nodes = desc.nodes.len(),
    edges = desc.edges.len(),
    workers = workers.len(),
    channels = channel_count,
    "compilation complete"
  );
  Ok(Pipeline::new(desc.name.clone(), config, control, workers))
}
