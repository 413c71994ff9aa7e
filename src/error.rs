//! Error types, one enum per layer.

use crate::types::RowErrorCause;
use thiserror::Error;

/// Channel operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
  /// The producer already marked the channel done, or the consumer is gone or stopped
  /// accepting rows.
  #[error("channel {0} is closed")]
  Closed(String),
  #[error("channel {0} is full")]
  Full(String),
}

/// Failures of the binary row codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
  #[error("truncated input at offset {0}")]
  Truncated(usize),
  #[error("unknown value tag {tag} at offset {offset}")]
  UnknownTag { tag: u8, offset: usize },
  #[error("invalid utf-8 string at offset {0}")]
  InvalidUtf8(usize),
  #[error("invalid decimal '{0}'")]
  InvalidDecimal(String),
  #[error("timestamp {0} out of range")]
  InvalidDate(i64),
  #[error("key field index {index} out of range for row of {len} values")]
  KeyIndexOutOfRange { index: usize, len: usize },
}

/// Failures raised by step business logic or the step I/O layer.
#[derive(Debug, Error)]
pub enum StepError {
  #[error("{0}")]
  Failed(String),
  #[error("invalid configuration: {0}")]
  Config(String),
  #[error("row rejected and no error output is configured: {0}")]
  RowRejected(RowErrorCause),
  #[error("schema mismatch: {0}")]
  SchemaMismatch(String),
  #[error(transparent)]
  Channel(#[from] ChannelError),
  #[error(transparent)]
  Codec(#[from] CodecError),
  #[error("no edge between this step and '{0}'")]
  UnknownTarget(String),
  /// An input ended with the upstream-failed flag.
  #[error("upstream channel {0} failed")]
  UpstreamFailed(String),
  /// Every output consumer is gone.
  #[error("all outputs closed")]
  OutputsClosed,
  #[error("aborted")]
  Aborted,
}

impl StepError {
  pub fn failed(msg: impl Into<String>) -> Self {
    StepError::Failed(msg.into())
  }

  pub fn config(msg: impl Into<String>) -> Self {
    StepError::Config(msg.into())
  }
}

/// Graph build failures, reported synchronously by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("parse error: {0}")]
  Parse(String),
  #[error("duplicate node id '{0}'")]
  DuplicateNode(String),
  #[error("edge {from} -> {to} references unknown node '{missing}'")]
  DanglingEdge {
    from: String,
    to: String,
    missing: String,
  },
  #[error("cycle through nodes {}", .0.join(", "))]
  Cycle(Vec<String>),
  #[error("node '{0}' must run at least one copy")]
  ZeroCopies(String),
  #[error("node '{node}' has unknown step type '{step_type}'")]
  UnknownStepType { node: String, step_type: String },
  #[error("node '{0}' has more than one error edge")]
  MultipleErrorEdges(String),
  #[error("node '{node}': {message}")]
  InvalidNode { node: String, message: String },
  #[error("invalid engine settings: {0}")]
  InvalidConfig(String),
  #[error("no node '{0}' with copy {1}")]
  UnknownCopy(String, usize),
}

/// Errors of the controller surface.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Graph(#[from] GraphError),
  #[error("step '{step}' copy {copy} failed to initialize: {source}")]
  InitFailed {
    step: String,
    copy: usize,
    #[source]
    source: StepError,
  },
  #[error("pipeline already started")]
  AlreadyStarted,
  #[error("pipeline not started")]
  NotStarted,
  #[error(transparent)]
  Io(#[from] std::io::Error),
}
