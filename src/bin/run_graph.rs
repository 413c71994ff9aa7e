//! CLI: run an ETL pipeline from a `.json` or `.dot` graph file.
//!
//! Usage: `run_graph [OPTIONS] <graph-file>`
//! Example: run_graph --report out/report.json tests/integration/keyed.dot
//!
//! Ctrl-C once requests a safe stop (sources stop, rows in flight drain); a second Ctrl-C
//! stops every step immediately.
//!
//! Set RUST_LOG=streamweave_etl=trace for TRACE-level span enter/exit and events.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use streamweave_etl::{
  EngineConfig, FailurePolicy, PipelineHandle, PipelineResult, SharedResources, StepRegistry,
  compile_pipeline, load_graph, report_io,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Run an ETL pipeline from a graph description.
#[derive(Parser, Debug)]
#[command(name = "run_graph")]
#[command(
  after_help = r#"Environment variables (override the graph's engine settings and the flags):
  STREAMWEAVE_ETL_CHANNEL_CAPACITY        Rows buffered per channel.
  STREAMWEAVE_ETL_ERROR_CHANNEL_CAPACITY  Rows buffered per error channel.
  STREAMWEAVE_ETL_ERROR_PUT_TIMEOUT_MS    Wait for room on a full error channel (0 = fail at once).
  STREAMWEAVE_ETL_FAILURE_POLICY          abort | isolate_branch
  STREAMWEAVE_ETL_SAFE_MODE               true | false

Examples:
  run_graph pipeline.json
  run_graph --failure-policy isolate_branch --report report.json pipeline.dot"#
)]
struct Args {
  /// Rows buffered per channel. Overridden by STREAMWEAVE_ETL_CHANNEL_CAPACITY if set.
  #[arg(long, value_name = "ROWS")]
  channel_capacity: Option<usize>,

  /// abort | isolate_branch. Overridden by STREAMWEAVE_ETL_FAILURE_POLICY if set.
  #[arg(long, value_name = "POLICY")]
  failure_policy: Option<FailurePolicy>,

  /// Check row arity and types on every put.
  #[arg(long)]
  safe_mode: bool,

  /// Write the run report (JSON) here.
  #[arg(long, value_name = "FILE")]
  report: Option<PathBuf>,

  /// Request a safe stop after this many seconds.
  #[arg(long, value_name = "SECS")]
  stop_after: Option<u64>,

  /// Validate the graph and exit without running it.
  #[arg(long)]
  check: bool,

  /// Path to the graph file (.json, .dot)
  #[arg(value_name = "graph-file")]
  graph_path: PathBuf,
}

fn apply_flags(engine: &mut EngineConfig, args: &Args) {
  if let Some(capacity) = args.channel_capacity {
    engine.channel_capacity = capacity;
  }
  if let Some(policy) = args.failure_policy {
    engine.failure_policy = policy;
  }
  if args.safe_mode {
    engine.safe_mode = true;
  }
}

/// Ctrl-C once: safe stop. Twice: stop everything.
async fn watch_interrupts(handle: PipelineHandle) {
  if tokio::signal::ctrl_c().await.is_err() {
    return;
  }
  warn!("interrupt: safe stop (press Ctrl-C again to abort)");
  handle.safe_stop();
  if tokio::signal::ctrl_c().await.is_err() {
    return;
  }
  warn!("interrupt: stopping all steps");
  handle.stop_all();
}

fn print_summary(result: &PipelineResult) {
  println!("Pipeline '{}' (run {})", result.pipeline, result.run_id);
  println!(
    "  {:<24} {:>4} {:<10} {:>10} {:>10} {:>10} {:>8}",
    "step", "copy", "state", "read", "written", "rejected", "errors"
  );
  for step in &result.steps {
    println!(
      "  {:<24} {:>4} {:<10} {:>10} {:>10} {:>10} {:>8}",
      step.step,
      step.copy,
      step.state.to_string(),
      step.counters.lines_read,
      step.counters.lines_written,
      step.counters.lines_rejected,
      step.counters.errors
    );
  }
  println!("  Elapsed: {} ms", result.elapsed_ms);
  if let Some(failure) = &result.first_error {
    println!(
      "  First error: {} copy {}: {}",
      failure.step, failure.copy, failure.message
    );
  }
  if result.is_truncated() {
    println!("  Stopped early by request.");
  }
  println!("  Success: {}", result.is_success());
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .init();

  info!("run_graph starting");
  let args = Args::parse();

  let mut desc = match load_graph(&args.graph_path) {
    Ok(d) => d,
    Err(e) => {
      eprintln!("Error loading {}: {}", args.graph_path.display(), e);
      process::exit(1);
    }
  };

  // Flags override the graph's settings; env vars override both.
  apply_flags(&mut desc.engine, &args);
  if let Err(e) = desc.engine.apply_env() {
    eprintln!("Error in environment: {}", e);
    process::exit(1);
  }
  info!(engine = ?desc.engine, "engine settings (graph, flags, env)");

  let registry = StepRegistry::with_builtin();
  let resources = SharedResources::new();
  let mut pipeline = match compile_pipeline(&desc, &registry, &resources) {
    Ok(p) => p,
    Err(e) => {
      eprintln!("Error building pipeline: {}", e);
      process::exit(1);
    }
  };
  if args.check {
    println!("Graph '{}' is valid.", desc.name);
    return;
  }

  let started = pipeline.start().await;
  if let Err(e) = &started {
    eprintln!("Pipeline failed to start: {}", e);
  } else {
    tokio::spawn(watch_interrupts(pipeline.handle()));
    if let Some(secs) = args.stop_after {
      let handle = pipeline.handle();
      tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        info!(secs, "stop-after elapsed: safe stop");
        handle.safe_stop();
      });
    }
  }

  let result = match pipeline.wait_until_finished().await {
    Ok(r) => r,
    Err(e) => {
      eprintln!("Pipeline error: {}", e);
      process::exit(1);
    }
  };
  print_summary(&result);

  if let Some(path) = &args.report {
    if let Err(e) = report_io::save_report(path, &result) {
      eprintln!("Error writing report {}: {}", path.display(), e);
      process::exit(1);
    }
    info!(path = %path.display(), "report written");
  }

  if started.is_err() || !result.is_success() {
    process::exit(1);
  }
}
