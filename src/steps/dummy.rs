//! Pass-through step; a sink when it has no outgoing edge.

use crate::error::StepError;
use crate::step::Step;
use crate::step_io::StepIo;
use async_trait::async_trait;

pub struct DummyStep;

impl DummyStep {
  pub const TYPE: &'static str = "dummy";
}

#[async_trait]
impl Step for DummyStep {
  async fn process_one_iteration(&mut self, io: &mut StepIo) -> Result<bool, StepError> {
    match io.get_row().await? {
      Some(row) => {
        io.put_row(row).await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }
}
