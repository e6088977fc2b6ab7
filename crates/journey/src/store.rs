//! Trigger store — the per-conversation list of steps already triggered,
//! kept in host storage so it survives page reloads.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use compass_web_sdk::{Storage, StorageError};

use crate::types::StepId;

/// Storage key for a conversation's triggered steps.
pub fn storage_key(conversation_id: &str) -> String {
    format!("jb-triggered-steps-{conversation_id}")
}

/// Reads the stored steps. Absent, unreadable or mis-shaped values all read
/// as "nothing triggered yet".
pub fn get_triggered_steps(storage: &dyn Storage, conversation_id: &str) -> Vec<StepId> {
    let key = storage_key(conversation_id);
    let raw = match storage.get_item(&key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(key = %key, error = %e, "Triggered steps unreadable; starting empty");
            return Vec::new();
        }
    };
    match parse_steps(&raw) {
        Some(steps) => steps,
        None => {
            warn!(key = %key, "Triggered steps malformed; starting empty");
            Vec::new()
        }
    }
}

/// Overwrites the stored steps.
pub fn save_triggered_steps(
    storage: &dyn Storage,
    conversation_id: &str,
    steps: &[StepId],
) -> Result<(), StorageError> {
    let key = storage_key(conversation_id);
    let value = serde_json::to_string(steps).map_err(|e| StorageError::Unavailable(e.to_string()))?;
    storage.set_item(&key, &value)?;
    debug!(key = %key, count = steps.len(), "Triggered steps saved");
    Ok(())
}

// Only a JSON array of strings is accepted.
fn parse_steps(raw: &str) -> Option<Vec<StepId>> {
    let Value::Array(items) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

/// Store bound to one conversation.
#[derive(Clone)]
pub struct TriggerStore {
    storage: Arc<dyn Storage>,
    conversation_id: String,
}

impl std::fmt::Debug for TriggerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerStore")
            .field("key", &storage_key(&self.conversation_id))
            .finish()
    }
}

impl TriggerStore {
    pub fn new(storage: Arc<dyn Storage>, conversation_id: impl Into<String>) -> Self {
        Self {
            storage,
            conversation_id: conversation_id.into(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn load(&self) -> Vec<StepId> {
        get_triggered_steps(self.storage.as_ref(), &self.conversation_id)
    }

    pub fn save(&self, steps: &[StepId]) -> Result<(), StorageError> {
        save_triggered_steps(self.storage.as_ref(), &self.conversation_id, steps)
    }
}
