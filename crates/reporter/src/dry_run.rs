use async_trait::async_trait;
use tracing::info;

use crate::{Context, ReportError, StepReporter};

/// Reporter that only logs; used when no backend should be contacted.
#[derive(Debug, Default, Clone)]
pub struct DryRunReporter;

#[async_trait]
impl StepReporter for DryRunReporter {
    async fn send_step(&self, step_id: &str, context: Option<Context>) -> Result<(), ReportError> {
        info!(step_id = %step_id, has_context = context.is_some(), "Dry run: step not sent");
        Ok(())
    }
}
