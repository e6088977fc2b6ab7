//! Decoded, directly executable queries and their synchronous evaluation
//! against a single snapshot of the element tree.

use std::collections::HashMap;

use regex::Regex;

use compass_web_sdk::{DomTree, ElementId, Selector};

use crate::encoded::SerializedRegex;

/// Compiled text matcher.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    Literal(String),
    Regex {
        regex: Regex,
        serialized: SerializedRegex,
    },
}

impl TextMatcher {
    /// Matches element text. Literals compare whole (whitespace-normalised)
    /// text when `exact`, otherwise a case-insensitive substring.
    pub fn matches_text(&self, text: &str, exact: bool) -> bool {
        match self {
            Self::Literal(literal) => {
                let literal = normalize_whitespace(literal);
                if exact {
                    text == literal
                } else {
                    text.to_lowercase().contains(&literal.to_lowercase())
                }
            }
            Self::Regex { regex, .. } => regex.is_match(text),
        }
    }

    /// Matches an attribute value verbatim.
    pub fn matches_value(&self, value: &str) -> bool {
        match self {
            Self::Literal(literal) => value == literal,
            Self::Regex { regex, .. } => regex.is_match(value),
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Select(Selector),
    Attribute {
        name: String,
        value: Option<TextMatcher>,
    },
    Text {
        matcher: TextMatcher,
        exact: bool,
    },
    Nth(i64),
    Closest(Selector),
    Parent,
    Descendants(Option<Selector>),
}

impl Stage {
    fn apply(&self, tree: &DomTree, input: Vec<ElementId>) -> Vec<ElementId> {
        match self {
            Self::Select(selector) => input
                .into_iter()
                .filter(|id| selector.matches(tree, *id))
                .collect(),
            Self::Attribute { name, value } => input
                .into_iter()
                .filter(|id| {
                    tree.get(*id)
                        .and_then(|el| el.attribute(name))
                        .is_some_and(|actual| value.as_ref().map_or(true, |m| m.matches_value(actual)))
                })
                .collect(),
            Self::Text { matcher, exact } => input
                .into_iter()
                .filter(|id| matcher.matches_text(&tree.text_content(*id), *exact))
                .collect(),
            Self::Nth(index) => {
                let len = input.len() as i64;
                let at = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&at) {
                    vec![input[at as usize]]
                } else {
                    Vec::new()
                }
            }
            Self::Closest(selector) => input
                .into_iter()
                .filter_map(|id| selector.closest(tree, id))
                .collect(),
            Self::Parent => input.into_iter().filter_map(|id| tree.parent(id)).collect(),
            Self::Descendants(selector) => input
                .into_iter()
                .flat_map(|id| tree.descendants(id))
                .filter(|id| selector.as_ref().map_or(true, |s| s.matches(tree, *id)))
                .collect(),
        }
    }
}

/// A query node: a stage plus the branches evaluated on its output.
#[derive(Debug, Clone)]
pub struct Query {
    pub stage: Stage,
    pub children: Vec<Query>,
}

impl Query {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            children: Vec::new(),
        }
    }

    pub fn then(mut self, child: Query) -> Self {
        self.children.push(child);
        self
    }
}

/// Evaluates `query` on one snapshot. The root stage sees every attached
/// element; the result is in document order without duplicates.
pub fn select(tree: &DomTree, query: &Query) -> Vec<ElementId> {
    let order = tree.document_order();
    let positions: HashMap<ElementId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    evaluate(tree, &positions, query, order)
}

fn evaluate(
    tree: &DomTree,
    positions: &HashMap<ElementId, usize>,
    query: &Query,
    input: Vec<ElementId>,
) -> Vec<ElementId> {
    let output = in_document_order(positions, query.stage.apply(tree, input));
    if query.children.is_empty() {
        return output;
    }
    let union = query
        .children
        .iter()
        .flat_map(|child| evaluate(tree, positions, child, output.clone()))
        .collect();
    in_document_order(positions, union)
}

// Detached elements have no position and are dropped here.
fn in_document_order(positions: &HashMap<ElementId, usize>, ids: Vec<ElementId>) -> Vec<ElementId> {
    let mut ranked: Vec<(usize, ElementId)> = ids
        .into_iter()
        .filter_map(|id| positions.get(&id).map(|p| (*p, id)))
        .collect();
    ranked.sort_unstable_by_key(|(p, _)| *p);
    ranked.dedup_by_key(|(p, _)| *p);
    ranked.into_iter().map(|(_, id)| id).collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
