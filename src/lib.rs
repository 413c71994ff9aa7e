//! # streamweave-etl
//!
//! Concurrent row-streaming ETL engine. A graph of steps connected by bounded channels is
//! compiled into one tokio task per step copy; rows stream from sources through
//! transformations to sinks with backpressure on every channel.
//!
//! ## Architecture
//!
//! - [`types`]: values, rows, schemas, graph descriptions, run results.
//! - [`channel`]: bounded, backpressured row queue with end-of-stream and error flags.
//! - [`step`] / [`step_io`]: the step contract and a worker's row I/O.
//! - [`compiler`] / [`pipeline`]: graph description → running workers; start, stop, wait.
//! - [`cache_index`]: bounded byte-key lookup cache with FIFO eviction.
//! - [`steps`]: built-in steps.

pub mod cache_index;
#[cfg(test)]
mod cache_index_test;
pub mod channel;
#[cfg(test)]
mod channel_test;
pub mod compiler;
pub mod config;
mod control;
pub mod dot_parser;
pub mod error;
pub mod pipeline;
mod producer;
pub mod report_io;
pub mod resources;
pub mod row_codec;
pub mod runner;
pub mod step;
pub mod step_io;
pub mod steps;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;
pub mod validate;
mod worker;

pub use cache_index::{CacheIndex, CacheStats, Lookup, SharedCacheIndex};
pub use channel::RowChannel;
pub use compiler::compile_pipeline;
pub use config::{EngineConfig, FailurePolicy};
pub use control::PipelineHandle;
pub use error::{ChannelError, CodecError, EngineError, GraphError, StepError};
pub use pipeline::{OutputTap, Pipeline, RowStream};
pub use producer::RowProducer;
pub use resources::SharedResources;
pub use runner::{RunOptions, load_graph, run_pipeline};
pub use step::{Step, StepContext, StepFactory, StepRegistry, decode_config};
pub use step_io::StepIo;
pub use types::{
  Distribution, EdgeRecord, FanOut, FieldMeta, GraphDescription, NodeRecord, PipelineResult,
  Row, RowErrorCause, Schema, StepReport, StepState, StepStatus, Value, ValueType,
};
