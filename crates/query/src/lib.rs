//! Element queries for click triggers — a closed, serializable query
//! vocabulary decoded from untrusted trigger exports, and an asynchronous
//! matcher that resolves queries against the live page.

pub mod codec;
pub mod encoded;
pub mod matcher;
pub mod query;

pub use codec::{decode, encode, DecodeError};
pub use encoded::{EncodedQuery, Method, SerializedRegex, TextPattern, QUERY_VOCABULARY_VERSION};
pub use matcher::{find, MatchPolicy};
pub use query::{select, Query, Stage, TextMatcher};
