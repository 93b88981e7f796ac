//! Path matching logic.
//!
//! # Responsibilities
//! - Match a fixed prefix followed by one captured segment
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Captured segments stay percent-encoded; decoding is the query parser's job
//! - No regex to guarantee O(n) matching

use std::fmt;

/// Parameters captured while matching a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(&'static str, String)>,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    fn with(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            pairs: vec![(name, value.into())],
        }
    }
}

/// Trait for matching request paths.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns captured parameters if the path matches.
    fn matches(&self, path: &str) -> Option<Params>;
}

/// Matches `<prefix><segment>` where the segment is non-empty and has no `/`.
#[derive(Debug, Clone)]
pub struct SegmentMatcher {
    prefix: &'static str,
    name: &'static str,
}

impl SegmentMatcher {
    /// `prefix` must end with `/`.
    pub fn new(prefix: &'static str, name: &'static str) -> Self {
        Self { prefix, name }
    }
}

impl Matcher for SegmentMatcher {
    fn matches(&self, path: &str) -> Option<Params> {
        let segment = path.strip_prefix(self.prefix)?;
        if segment.is_empty() || segment.contains('/') {
            return None;
        }
        Some(Params::with(self.name, segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_matcher() {
        let matcher = SegmentMatcher::new("/lookup/", "query");

        let params = matcher.matches("/lookup/1,2%2C3").unwrap();
        assert_eq!(params.get("query"), Some("1,2%2C3"));
        assert_eq!(params.get("other"), None);

        assert_eq!(matcher.matches("/lookup/"), None);
        assert_eq!(matcher.matches("/lookup"), None);
        assert_eq!(matcher.matches("/lookup/1/2"), None);
    }
}
