//! Data types shared across the engine: values, rows, schemas, graph descriptions, results.

mod distribution;
mod graph_description;
mod pipeline_result;
#[cfg(test)]
mod pipeline_result_test;
mod row;
mod row_error;
#[cfg(test)]
mod row_test;
mod schema;
#[cfg(test)]
mod schema_test;
mod step_counters;
mod step_state;
#[cfg(test)]
mod step_state_test;
mod value;

pub use distribution::{Distribution, FanOut};
pub use graph_description::{EdgeRecord, GraphDescription, NodeRecord};
pub use pipeline_result::{PipelineResult, StepFailure, StepReport, StepStatus};
pub use row::Row;
pub use row_error::{
  ERROR_CODES_FIELD, ERROR_COUNT_FIELD, ERROR_DESCRIPTIONS_FIELD, ERROR_FIELDS_FIELD,
  RowErrorCause, error_fields,
};
pub use schema::{FieldMeta, Schema};
pub use step_counters::{CounterSnapshot, StepCounters};
pub use step_state::StepState;
pub use value::{Value, ValueType};
