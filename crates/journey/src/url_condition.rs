use serde::{Deserialize, Serialize};
use tracing::debug;

/// Comparison applied between the current URL and a condition's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlOperator {
    Eq,
    Neq,
    Prefix,
    Suffix,
    Contains,
    NotContains,
    /// Any operator this build does not know. Never matches.
    #[serde(other)]
    Unknown,
}

/// A URL constraint on a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCondition {
    pub operator: UrlOperator,
    pub value: String,
}

impl UrlCondition {
    pub fn new(operator: UrlOperator, value: impl Into<String>) -> Self {
        Self {
            operator,
            value: value.into(),
        }
    }

    /// Evaluates the condition against `url`. Callers pass the current
    /// location on every check; nothing is cached.
    pub fn matches(&self, url: &str) -> bool {
        let value = self.value.as_str();
        match self.operator {
            UrlOperator::Eq => url == value,
            UrlOperator::Neq => url != value,
            UrlOperator::Prefix => url.starts_with(value),
            UrlOperator::Suffix => url.ends_with(value),
            UrlOperator::Contains => url.contains(value),
            UrlOperator::NotContains => !url.contains(value),
            UrlOperator::Unknown => {
                debug!(value = %value, "Unknown URL operator never matches");
                false
            }
        }
    }
}
