//! Run report save/load (JSON).

use crate::types::PipelineResult;
use std::path::Path;
use tracing::instrument;

/// Default filename of the run report.
pub const REPORT_FILENAME: &str = "pipeline-report.json";

/// Writes `result` to `path` as pretty JSON, creating parent directories.
#[instrument(level = "trace", skip(path, result))]
pub fn save_report(path: &Path, result: &PipelineResult) -> Result<(), std::io::Error> {
  let json = serde_json::to_string_pretty(result)
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, json)
}

/// Reads a report written by [`save_report`]. Fails if the file is missing or not a report.
#[instrument(level = "trace", skip(path))]
pub fn load_report(path: &Path) -> Result<PipelineResult, std::io::Error> {
  let bytes = std::fs::read(path)?;
  serde_json::from_slice(&bytes)
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
