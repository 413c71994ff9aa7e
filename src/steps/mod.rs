//! Built-in steps. Each owns a typed config decoded from the node's JSON config.

mod abort;
#[cfg(test)]
mod abort_test;
mod delay;
mod dimension_key;
#[cfg(test)]
mod dimension_key_test;
mod dummy;
mod generate_rows;
mod write_log;

pub use abort::{AbortConfig, AbortMode, AbortStep};
pub use delay::{DelayConfig, DelayStep};
pub use dimension_key::{
  DimensionKeyConfig, DimensionKeyStep, KEY_NOT_FOUND_CODE, KeyStore, KeyStoreHandle, LookupMode,
  MemoryKeyStore, keystore_resource_name,
};
pub use dummy::DummyStep;
pub use generate_rows::{GenerateRowsConfig, GenerateRowsStep, GeneratedField};
pub use write_log::{WriteLogConfig, WriteLogStep};

use crate::step::{Step, StepRegistry};

/// Registers every built-in step under its type name.
pub fn register_builtin(registry: &mut StepRegistry) {
  registry
    .register(GenerateRowsStep::TYPE, |node| {
      Ok(Box::new(GenerateRowsStep::from_node(node)?) as Box<dyn Step>)
    })
    .register(DummyStep::TYPE, |_| Ok(Box::new(DummyStep) as Box<dyn Step>))
    .register(DelayStep::TYPE, |node| {
      Ok(Box::new(DelayStep::from_node(node)?) as Box<dyn Step>)
    })
    .register(AbortStep::TYPE, |node| {
      Ok(Box::new(AbortStep::from_node(node)?) as Box<dyn Step>)
    })
    .register(DimensionKeyStep::TYPE, |node| {
      Ok(Box::new(DimensionKeyStep::from_node(node)?) as Box<dyn Step>)
    })
    .register(WriteLogStep::TYPE, |node| {
      Ok(Box::new(WriteLogStep::from_node(node)?) as Box<dyn Step>)
    });
}
