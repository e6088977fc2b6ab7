use serde::{Deserialize, Serialize};

use crate::engine::JourneyError;

/// Where a trigger stands within the current engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Idle,
    Candidate,
    Suppressed,
    Reported,
}

/// Describes a single valid state transition for a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TriggerState,
    pub to: TriggerState,
    pub trigger: String,
}

/// Guards a trigger's lifecycle. `Suppressed` and `Reported` are terminal for
/// once-only triggers; repeatable triggers may become candidates again.
#[derive(Debug, Clone)]
pub struct TriggerLifecycle {
    pub state: TriggerState,
    pub once: bool,
    pub transitions: Vec<StateTransition>,
}

impl TriggerLifecycle {
    pub fn new(once: bool) -> Self {
        let mut transitions = vec![
            StateTransition {
                from: TriggerState::Idle,
                to: TriggerState::Candidate,
                trigger: "matching_event".to_string(),
            },
            StateTransition {
                from: TriggerState::Candidate,
                to: TriggerState::Suppressed,
                trigger: "already_triggered".to_string(),
            },
            StateTransition {
                from: TriggerState::Candidate,
                to: TriggerState::Reported,
                trigger: "step_sent".to_string(),
            },
        ];
        if !once {
            transitions.push(StateTransition {
                from: TriggerState::Reported,
                to: TriggerState::Candidate,
                trigger: "matching_event".to_string(),
            });
        }

        Self {
            state: TriggerState::Idle,
            once,
            transitions,
        }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: TriggerState, to: TriggerState) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// No further event can move this trigger.
    pub fn is_terminal(&self) -> bool {
        !self
            .transitions
            .iter()
            .any(|t| t.from == self.state)
    }

    /// Attempts to move to `to`. Returns an error if the transition is not
    /// permitted.
    pub fn transition(&mut self, to: TriggerState) -> Result<(), JourneyError> {
        if self.can_transition(self.state, to) {
            self.state = to;
            Ok(())
        } else {
            Err(JourneyError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}
