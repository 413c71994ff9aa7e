//! One-call helpers: load a graph file, compile it, run it to completion.
//!
//! - [load_graph]: read a `.dot` or `.json` graph description.
//! - [run_pipeline]: compile, start, wait, optionally save the run report.

use crate::compiler::compile_pipeline;
use crate::dot_parser::parse_dot;
use crate::error::{EngineError, GraphError};
use crate::report_io::save_report;
use crate::resources::SharedResources;
use crate::step::StepRegistry;
use crate::types::{GraphDescription, PipelineResult};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Reads a graph description. Files ending in `.dot` or `.gv` are parsed as DOT, anything
/// else as JSON.
#[instrument(level = "trace")]
pub fn load_graph(path: &Path) -> Result<GraphDescription, EngineError> {
  let source = std::fs::read_to_string(path)?;
  let is_dot = path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case("dot") || e.eq_ignore_ascii_case("gv"));
  let desc = if is_dot {
    parse_dot(&source)?
  } else {
    GraphDescription::from_json_str(&source)?
  };
  info!(pipeline = %desc.name, nodes = desc.nodes.len(), edges = desc.edges.len(), "graph loaded");
  Ok(desc)
}

/// Options for [run_pipeline].
#[derive(Debug, Default)]
pub struct RunOptions<'a> {
  /// If set, the run report is written here, also when start fails.
  pub report_path: Option<&'a Path>,
  /// Shared objects (key stores, connection groups) visible to every step.
  pub resources: Option<SharedResources>,
}

/// Compiles and runs `desc` to completion. A failed init returns
/// [`EngineError::InitFailed`]; a run that ends with step errors returns `Ok` with the
/// errors in the result.
pub async fn run_pipeline(
  desc: &GraphDescription,
  registry: &StepRegistry,
  options: RunOptions<'_>,
) -> Result<PipelineResult, EngineError> {
  let resources = options.resources.unwrap_or_default();
  let mut pipeline = compile_pipeline(desc, registry, &resources)?;
  if let Err(e) = pipeline.start().await {
    warn!(error = %e, "pipeline failed to start");
    if let Some(path) = options.report_path {
      let result = pipeline.wait_until_finished().await?;
      save_report(path, &result)?;
    }
    return Err(e);
  }
  let result = pipeline.wait_until_finished().await?;
  if let Some(path) = options.report_path {
    save_report(path, &result)?;
  }
  Ok(result)
}

/// Parses and validates `source` as DOT without building steps.
pub fn check_dot(source: &str) -> Result<GraphDescription, GraphError> {
  let desc = parse_dot(source)?;
  crate::validate::validate(&desc)?;
  Ok(desc)
}
