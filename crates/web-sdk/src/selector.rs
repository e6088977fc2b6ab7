//! CSS selector subset used by exported triggers.
//!
//! Supported: type selectors and `*`, `#id`, `.class`, attribute selectors
//! (`[a]`, `[a=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`, `[a~=v]`), descendant and
//! child (`>`) combinators, and comma-separated selector lists. Anything else
//! is rejected at parse time rather than silently ignored.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use crate::dom::{DomTree, ElementId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector `{selector}` at offset {position}: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Substring,
    Includes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeSelector {
    name: String,
    op: AttributeOp,
    value: String,
}

impl AttributeSelector {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self.op {
            AttributeOp::Exists => true,
            AttributeOp::Equals => actual == self.value,
            AttributeOp::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttributeOp::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttributeOp::Substring => !self.value.is_empty() && actual.contains(&self.value),
            AttributeOp::Includes => actual.split_whitespace().any(|w| w == self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeSelector>,
}

impl Compound {
    fn matches(&self, tree: &DomTree, id: ElementId) -> bool {
        let Some(el) = tree.get(id) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if el.tag() != tag {
                return false;
            }
        }
        if let Some(want) = &self.id {
            if el.attribute("id") != Some(want.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| el.classes().any(|have| have == c)) {
            return false;
        }
        self.attributes
            .iter()
            .all(|a| a.matches(el.attribute(&a.name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One selector of a comma-separated list: compounds joined by combinators,
/// written left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

/// Outcome of matching a selector suffix against one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Matched,
    /// The compound itself failed here; a higher ancestor may still match.
    Unmatched,
    /// A child chain failed; only the nearest descendant combinator may retry.
    RestartFromDescendant,
    /// No ancestor can satisfy the rest of the selector.
    Exhausted,
}

impl Complex {
    fn matches(&self, tree: &DomTree, id: ElementId) -> bool {
        self.matches_at(tree, id, self.compounds.len() - 1) == Outcome::Matched
    }

    // Right to left. A descendant combinator that runs out of ancestors
    // fails the whole selector, which keeps matching linear in tree depth.
    fn matches_at(&self, tree: &DomTree, id: ElementId, index: usize) -> Outcome {
        if !self.compounds[index].matches(tree, id) {
            return Outcome::Unmatched;
        }
        if index == 0 {
            return Outcome::Matched;
        }
        let combinator = self.combinators[index - 1];
        let mut current = id;
        loop {
            let Some(parent) = tree.parent(current) else {
                return Outcome::Exhausted;
            };
            let outcome = self.matches_at(tree, parent, index - 1);
            match (outcome, combinator) {
                (Outcome::Matched | Outcome::Exhausted, _) => return outcome,
                (_, Combinator::Child) => return Outcome::RestartFromDescendant,
                (_, Combinator::Descendant) => current = parent,
            }
        }
    }
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let alternatives = Parser::new(source).parse_list()?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// The selector text this was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, tree: &DomTree, id: ElementId) -> bool {
        self.alternatives.iter().any(|c| c.matches(tree, id))
    }

    /// Nearest ancestor-or-self of `id` matching this selector.
    pub fn closest(&self, tree: &DomTree, id: ElementId) -> Option<ElementId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if self.matches(tree, candidate) {
                return Some(candidate);
            }
            current = tree.parent(candidate);
        }
        None
    }

    /// Every attached element matching this selector, in document order.
    pub fn query_all(&self, tree: &DomTree) -> Vec<ElementId> {
        tree.document_order()
            .into_iter()
            .filter(|id| self.matches(tree, *id))
            .collect()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.source.len())
    }

    fn error(&mut self, reason: impl Into<String>) -> SelectorError {
        SelectorError {
            selector: self.source.to_string(),
            position: self.position(),
            reason: reason.into(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
            skipped = true;
        }
        skipped
    }

    fn parse_list(&mut self) -> Result<Vec<Complex>, SelectorError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_whitespace();
            alternatives.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(alternatives),
                Some(',') => {
                    self.bump();
                }
                Some(c) => return Err(self.error(format!("unexpected character `{c}`"))),
            }
        }
    }

    fn parse_complex(&mut self) -> Result<Complex, SelectorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.bump();
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected character `{c}`"))),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut parsed_any = false;

        match self.peek() {
            Some('*') => {
                self.bump();
                parsed_any = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                parsed_any = true;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.parse_attribute()?);
                }
                _ => break,
            }
            parsed_any = true;
        }

        if parsed_any {
            Ok(compound)
        } else {
            Err(self.error("expected a selector"))
        }
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let mut ident = String::new();
        while let Some(c) = self.peek().filter(|c| is_ident_char(*c)) {
            ident.push(c);
            self.bump();
        }
        if ident.is_empty() {
            Err(self.error("expected an identifier"))
        } else {
            Ok(ident)
        }
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(AttributeSelector {
                    name,
                    op: AttributeOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => AttributeOp::Equals,
            Some('^') => AttributeOp::Prefix,
            Some('$') => AttributeOp::Suffix,
            Some('*') => AttributeOp::Substring,
            Some('~') => AttributeOp::Includes,
            _ => return Err(self.error("expected an attribute operator or `]`")),
        };
        self.bump();
        if op != AttributeOp::Equals && self.bump() != Some('=') {
            return Err(self.error("expected `=`"));
        }

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            }
            _ => self.parse_ident()?,
        };
        self.skip_whitespace();
        if self.bump() != Some(']') {
            return Err(self.error("expected `]`"));
        }
        Ok(AttributeSelector { name, op, value })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
