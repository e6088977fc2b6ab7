//! Wire shape of exported queries.
//!
//! ```json
//! { "operation": "select", "selector": "form#checkout",
//!   "children": [ { "operation": "text", "pattern": { "source": "^pay", "flags": "i" } } ] }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Highest vocabulary version this build can decode.
pub const QUERY_VOCABULARY_VERSION: u32 = 1;

/// A serialized query stage. Operation arguments live next to `operation`;
/// they are validated only when the query is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub operation: String,
    #[serde(flatten)]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EncodedQuery>,
}

impl EncodedQuery {
    pub fn new(method: Method) -> Self {
        Self {
            version: None,
            operation: method.as_str().to_string(),
            arguments: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.to_string(), value.into());
        self
    }

    pub fn child(mut self, child: EncodedQuery) -> Self {
        self.children.push(child);
        self
    }

    pub fn method(&self) -> Method {
        Method::parse(&self.operation)
    }
}

/// The closed operation vocabulary. Anything not listed decodes to
/// [`Method::Unknown`], which is always a decode error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Select,
    Attribute,
    Text,
    Nth,
    Closest,
    Parent,
    Descendants,
    Unknown(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "select" => Self::Select,
            "attribute" => Self::Attribute,
            "text" => Self::Text,
            "nth" => Self::Nth,
            "closest" => Self::Closest,
            "parent" => Self::Parent,
            "descendants" => Self::Descendants,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Select => "select",
            Self::Attribute => "attribute",
            Self::Text => "text",
            Self::Nth => "nth",
            Self::Closest => "closest",
            Self::Parent => "parent",
            Self::Descendants => "descendants",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A regular expression carried as data, never as an executable pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRegex {
    pub source: String,
    #[serde(default)]
    pub flags: String,
}

impl SerializedRegex {
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }
}

/// Text to match: a literal string or a serialized regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextPattern {
    Literal(String),
    Regex(SerializedRegex),
}
