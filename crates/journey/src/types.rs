use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use compass_query::EncodedQuery;

use crate::url_condition::UrlCondition;

/// Externally assigned identity of a journey step.
pub type StepId = String;

/// Browser event a trigger listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerEvent {
    PageLoad,
    Click,
    /// Not a recognised event; such triggers are inert.
    #[serde(other)]
    Unknown,
}

/// Rule binding a step to an observable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub event: TriggerEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<EncodedQuery>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub once: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_condition: Option<UrlCondition>,
}

// Exports write `"once": null` for triggers that never set it.
fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl Trigger {
    pub fn page_load() -> Self {
        Self {
            event: TriggerEvent::PageLoad,
            query: None,
            once: false,
            url_condition: None,
        }
    }

    pub fn click(query: EncodedQuery) -> Self {
        Self {
            event: TriggerEvent::Click,
            query: Some(query),
            once: false,
            url_condition: None,
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn when(mut self, condition: UrlCondition) -> Self {
        self.url_condition = Some(condition);
        self
    }
}

/// The trigger table, in authoring order. Order breaks ties between click
/// triggers that match the same element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Triggers(IndexMap<StepId, Trigger>);

impl Triggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a table leniently: entries that are not shaped like a trigger
    /// are dropped with a warning and the rest load in order.
    pub fn from_entries(raw: IndexMap<StepId, Value>) -> Self {
        let mut triggers = IndexMap::with_capacity(raw.len());
        for (step_id, value) in raw {
            match serde_json::from_value::<Trigger>(value) {
                Ok(trigger) => {
                    triggers.insert(step_id, trigger);
                }
                Err(e) => warn!(step_id = %step_id, error = %e, "Dropping malformed trigger"),
            }
        }
        Self(triggers)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(mut self, step_id: impl Into<StepId>, trigger: Trigger) -> Self {
        self.0.insert(step_id.into(), trigger);
        self
    }

    pub fn get(&self, step_id: &str) -> Option<&Trigger> {
        self.0.get(step_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &Trigger)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every trigger declares a URL condition. Vacuously true for an
    /// empty table.
    pub fn all_url_scoped(&self) -> bool {
        self.0.values().all(|t| t.url_condition.is_some())
    }
}

impl<'de> Deserialize<'de> for Triggers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<StepId, Value>::deserialize(deserializer)?;
        Ok(Self::from_entries(raw))
    }
}

impl FromIterator<(StepId, Trigger)> for Triggers {
    fn from_iter<I: IntoIterator<Item = (StepId, Trigger)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url_condition::UrlOperator;

    #[test]
    fn test_table_keeps_authoring_order() {
        let table = Triggers::from_json(
            r#"{
                "zeta":  { "event": "pageLoad" },
                "alpha": { "event": "click", "query": { "operation": "select", "selector": "a" }, "once": true },
                "mid":   { "event": "pageLoad", "urlCondition": { "operator": "prefix", "value": "https://" } }
            }"#,
        )
        .unwrap();
        let ids: Vec<&str> = table.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);

        let alpha = table.get("alpha").unwrap();
        assert_eq!(alpha.event, TriggerEvent::Click);
        assert!(alpha.once);
        assert!(alpha.query.is_some());
        assert_eq!(
            table.get("mid").unwrap().url_condition,
            Some(UrlCondition::new(UrlOperator::Prefix, "https://"))
        );
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let table = Triggers::from_json(
            r#"{
                "ok":      { "event": "pageLoad" },
                "noevent": { "once": true },
                "badonce": { "event": "click", "once": "yes" },
                "hover":   { "event": "hover" }
            }"#,
        )
        .unwrap();
        let ids: Vec<&str> = table.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "hover"]);
        assert_eq!(table.get("hover").unwrap().event, TriggerEvent::Unknown);
    }

    #[test]
    fn test_all_url_scoped() {
        let scoped = Triggers::new()
            .insert("a", Trigger::page_load().when(UrlCondition::new(UrlOperator::Eq, "x")));
        assert!(scoped.all_url_scoped());
        assert!(!scoped.clone().insert("b", Trigger::page_load()).all_url_scoped());
        assert!(Triggers::new().all_url_scoped());
    }

    #[test]
    fn test_null_once_reads_as_repeatable() {
        let table = Triggers::from_json(
            r#"{ "s1": { "event": "pageLoad", "once": null, "urlCondition": null } }"#,
        )
        .unwrap();
        let trigger = table.get("s1").unwrap();
        assert!(!trigger.once);
        assert!(trigger.url_condition.is_none());
    }
}
