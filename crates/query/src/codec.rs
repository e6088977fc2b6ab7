//! Query codec — validates an [`EncodedQuery`] against the closed vocabulary
//! and compiles it into an executable [`Query`], and back.

use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use compass_web_sdk::{Selector, SelectorError};

use crate::encoded::{EncodedQuery, Method, SerializedRegex, TextPattern, QUERY_VOCABULARY_VERSION};
use crate::query::{Query, Stage, TextMatcher};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported query vocabulary version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unknown query operation `{0}`")]
    UnknownOperation(String),

    #[error("invalid arguments for `{operation}`: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error(transparent)]
    InvalidSelector(#[from] SelectorError),

    #[error("invalid regex /{pattern}/: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("unsupported regex flag `{flag}` in /{pattern}/{flags}")]
    UnsupportedRegexFlag {
        pattern: String,
        flags: String,
        flag: char,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectorArgs {
    selector: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AttributeArgs {
    name: String,
    #[serde(default)]
    value: Option<TextPattern>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TextArgs {
    pattern: TextPattern,
    #[serde(default = "default_exact")]
    exact: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NthArgs {
    index: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DescendantsArgs {
    #[serde(default)]
    selector: Option<String>,
}

fn default_exact() -> bool {
    true
}

/// Decodes a serialized query. Pure: no page access, same input, same result.
pub fn decode(encoded: &EncodedQuery) -> Result<Query, DecodeError> {
    if let Some(found) = encoded.version {
        if found > QUERY_VOCABULARY_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found,
                supported: QUERY_VOCABULARY_VERSION,
            });
        }
    }

    let method = encoded.method();
    let stage = match &method {
        Method::Select => {
            let args: SelectorArgs = arguments(&method, &encoded.arguments)?;
            Stage::Select(Selector::parse(&args.selector)?)
        }
        Method::Attribute => {
            let args: AttributeArgs = arguments(&method, &encoded.arguments)?;
            Stage::Attribute {
                name: args.name,
                value: args.value.map(compile_pattern).transpose()?,
            }
        }
        Method::Text => {
            let args: TextArgs = arguments(&method, &encoded.arguments)?;
            Stage::Text {
                matcher: compile_pattern(args.pattern)?,
                exact: args.exact,
            }
        }
        Method::Nth => {
            let args: NthArgs = arguments(&method, &encoded.arguments)?;
            Stage::Nth(args.index)
        }
        Method::Closest => {
            let args: SelectorArgs = arguments(&method, &encoded.arguments)?;
            Stage::Closest(Selector::parse(&args.selector)?)
        }
        Method::Parent => {
            let _: NoArgs = arguments(&method, &encoded.arguments)?;
            Stage::Parent
        }
        Method::Descendants => {
            let args: DescendantsArgs = arguments(&method, &encoded.arguments)?;
            Stage::Descendants(args.selector.as_deref().map(Selector::parse).transpose()?)
        }
        Method::Unknown(name) => return Err(DecodeError::UnknownOperation(name.clone())),
    };

    let children = encoded
        .children
        .iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Query { stage, children })
}

/// Canonical serialized form of a decoded query.
pub fn encode(query: &Query) -> EncodedQuery {
    let (method, arguments) = match &query.stage {
        Stage::Select(selector) => (Method::Select, object(json!({ "selector": selector.source() }))),
        Stage::Attribute { name, value } => {
            let mut args = object(json!({ "name": name }));
            if let Some(matcher) = value {
                args.insert("value".into(), pattern_value(matcher));
            }
            (Method::Attribute, args)
        }
        Stage::Text { matcher, exact } => (
            Method::Text,
            object(json!({ "pattern": pattern_value(matcher), "exact": exact })),
        ),
        Stage::Nth(index) => (Method::Nth, object(json!({ "index": index }))),
        Stage::Closest(selector) => (Method::Closest, object(json!({ "selector": selector.source() }))),
        Stage::Parent => (Method::Parent, Map::new()),
        Stage::Descendants(selector) => {
            let mut args = Map::new();
            if let Some(selector) = selector {
                args.insert("selector".into(), Value::from(selector.source()));
            }
            (Method::Descendants, args)
        }
    };

    EncodedQuery {
        version: None,
        operation: method.as_str().to_string(),
        arguments,
        children: query.children.iter().map(encode).collect(),
    }
}

fn arguments<T: DeserializeOwned>(method: &Method, args: &Map<String, Value>) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| DecodeError::InvalidArguments {
        operation: method.to_string(),
        reason: e.to_string(),
    })
}

fn compile_pattern(pattern: TextPattern) -> Result<TextMatcher, DecodeError> {
    match pattern {
        TextPattern::Literal(literal) => Ok(TextMatcher::Literal(literal)),
        TextPattern::Regex(serialized) => {
            let mut builder = RegexBuilder::new(&serialized.source);
            for flag in serialized.flags.chars() {
                match flag {
                    'i' => {
                        builder.case_insensitive(true);
                    }
                    'm' => {
                        builder.multi_line(true);
                    }
                    's' => {
                        builder.dot_matches_new_line(true);
                    }
                    // unicode is always on; global/sticky are meaningless for a stateless test
                    'u' | 'g' | 'y' => {}
                    other => {
                        return Err(DecodeError::UnsupportedRegexFlag {
                            pattern: serialized.source.clone(),
                            flags: serialized.flags.clone(),
                            flag: other,
                        })
                    }
                }
            }
            let regex = builder.build().map_err(|e| DecodeError::InvalidRegex {
                pattern: serialized.source.clone(),
                reason: e.to_string(),
            })?;
            Ok(TextMatcher::Regex { regex, serialized })
        }
    }
}

fn pattern_value(matcher: &TextMatcher) -> Value {
    let pattern = match matcher {
        TextMatcher::Literal(literal) => TextPattern::Literal(literal.clone()),
        TextMatcher::Regex { serialized, .. } => TextPattern::Regex(serialized.clone()),
    };
    to_value(&pattern)
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
