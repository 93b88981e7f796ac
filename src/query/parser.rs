//! Query validation and normalization.
//!
//! Turns raw request input into canonical backend keys: decode, collapse
//! whitespace, trim, lowercase. Empty input never becomes a `Query`.

use percent_encoding::percent_decode_str;
use url::form_urlencoded;

/// An ordered, non-empty sequence of normalized keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    keys: Vec<String>,
}

impl Query {
    fn from_keys(keys: Vec<String>) -> Option<Self> {
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    /// Keys in write order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn into_keys(self) -> Vec<String> {
        self.keys
    }
}

/// Parses request input into a [`Query`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser {
    dedupe_tokens: bool,
}

impl QueryParser {
    /// `dedupe_tokens` drops repeated tokens inside a search or suggest term.
    pub fn new(dedupe_tokens: bool) -> Self {
        Self { dedupe_tokens }
    }

    /// Parse the `q` parameter of a raw query string (without the `?`).
    pub fn parse_term(&self, raw_query: Option<&str>) -> Option<Query> {
        let raw = raw_query?;
        let value = form_urlencoded::parse(raw.as_bytes())
            .find(|(name, _)| name == "q")
            .map(|(_, value)| value.into_owned())?;

        let key = if self.dedupe_tokens {
            dedupe(&value)
        } else {
            normalize(&value)
        }?;
        Query::from_keys(vec![key])
    }

    /// Parse a percent-encoded, comma-separated list of guids.
    pub fn parse_guids(&self, raw_segment: &str) -> Option<Query> {
        let decoded = percent_decode_str(raw_segment).decode_utf8_lossy();
        let mut keys: Vec<String> = Vec::new();
        for key in decoded.split(',').filter_map(normalize) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Query::from_keys(keys)
    }
}

/// Collapse whitespace runs to one space, trim, lowercase.
/// Returns `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<String> {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined.to_lowercase())
    }
}

fn dedupe(raw: &str) -> Option<String> {
    let normalized = normalize(raw)?;
    let mut seen: Vec<&str> = Vec::new();
    for token in normalized.split(' ') {
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    Some(seen.join(" "))
}
