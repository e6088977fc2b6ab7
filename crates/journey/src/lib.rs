//! Journey trigger engine — correlates page loads and clicks with an
//! exported trigger table and reports each matching step to the tracking
//! backend, at most once per conversation unless the trigger repeats.

pub mod engine;
pub mod state_machine;
pub mod store;
pub mod types;
pub mod url_condition;

pub use engine::{
    run, run_with_client, DigressionCallback, EngineSettings, JourneyError, RunOutput, RunProps,
};
pub use state_machine::{TriggerLifecycle, TriggerState};
pub use store::{get_triggered_steps, save_triggered_steps, storage_key, TriggerStore};
pub use types::{StepId, Trigger, TriggerEvent, Triggers};
pub use url_condition::{UrlCondition, UrlOperator};
