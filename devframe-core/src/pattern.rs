//! Mock route patterns.
//!
//! A pattern is a literal path, or a glob where `*` matches any run of characters and
//! `:name` matches exactly one path segment. Globs are compiled once, at registration.
//!
//! Lookup contract: a path equal to a registered pattern string always selects that
//! pattern. Otherwise the first glob in registration order that matches wins.
//! Re-registering a pattern replaces its response and keeps its original position.

use crate::error::{ProxyError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum MockPattern {
    Literal(String),
    Glob { source: String, regex: Regex },
}

impl MockPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        if !is_glob(pattern) {
            return Ok(MockPattern::Literal(pattern.to_string()));
        }

        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| ProxyError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        Ok(MockPattern::Glob {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        match self {
            MockPattern::Literal(source) => source,
            MockPattern::Glob { source, .. } => source,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            MockPattern::Literal(source) => source == path,
            MockPattern::Glob { regex, .. } => regex.is_match(path),
        }
    }
}

fn is_param_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_glob(pattern: &str) -> bool {
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => return true,
            ':' if chars.peek().copied().is_some_and(is_param_start) => return true,
            _ => {}
        }
    }
    false
}

/// `*` becomes `.*`, `:name` becomes `[^/]+`, everything else is matched literally.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            ':' if chars.peek().copied().is_some_and(is_param_start) => {
                while chars.peek().copied().is_some_and(is_param_start) {
                    chars.next();
                }
                out.push_str("[^/]+");
            }
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    out.push('$');
    out
}

#[derive(Debug, Clone)]
struct MockRoute {
    pattern: MockPattern,
    response: Value,
}

/// The mock routes of one session.
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    routes: Vec<MockRoute>,
    index: HashMap<String, usize>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the response for `pattern`.
    pub fn insert(&mut self, pattern: &str, response: Value) -> Result<()> {
        if let Some(&idx) = self.index.get(pattern) {
            self.routes[idx].response = response;
            return Ok(());
        }

        let compiled = MockPattern::compile(pattern)?;
        self.index.insert(pattern.to_string(), self.routes.len());
        self.routes.push(MockRoute {
            pattern: compiled,
            response,
        });
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(&idx) = self.index.get(path) {
            return Some(&self.routes[idx].response);
        }
        self.routes
            .iter()
            .filter(|route| matches!(route.pattern, MockPattern::Glob { .. }))
            .find(|route| route.pattern.matches(path))
            .map(|route| &route.response)
    }

    pub fn clear(&mut self) {
        self.routes.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.pattern.source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_has_no_regex() {
        assert!(matches!(
            MockPattern::compile("/api/user").unwrap(),
            MockPattern::Literal(_)
        ));
        // A colon not followed by a name is literal text.
        assert!(matches!(
            MockPattern::compile("/time/12:30").unwrap(),
            MockPattern::Literal(_)
        ));
    }

    #[test]
    fn test_glob_regex_shape() {
        assert_eq!(glob_to_regex("/api/*"), "^/api/.*$");
        assert_eq!(glob_to_regex("/users/:id/posts"), "^/users/[^/]+/posts$");
        assert_eq!(glob_to_regex("/a.b/:x*"), r"^/a\.b/[^/]+.*$");
    }

    #[test]
    fn test_param_matches_one_segment() {
        let pattern = MockPattern::compile("/users/:id").unwrap();
        assert!(pattern.matches("/users/42"));
        assert!(!pattern.matches("/users/42/posts"));
        assert!(!pattern.matches("/users/"));
    }

    #[test]
    fn test_wildcard_spans_segments() {
        let pattern = MockPattern::compile("/api/*").unwrap();
        assert!(pattern.matches("/api/v1/orders/7"));
        assert!(!pattern.matches("/apiv1"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let pattern = MockPattern::compile("/search(v2)/*").unwrap();
        assert!(pattern.matches("/search(v2)/x"));
        assert!(!pattern.matches("/searchv2/x"));
    }

    #[test]
    fn test_exact_match_beats_earlier_glob() {
        let mut table = MockTable::new();
        table.insert("/api/*", json!({"from": "glob"})).unwrap();
        table.insert("/api/me", json!({"from": "exact"})).unwrap();

        assert_eq!(table.lookup("/api/me"), Some(&json!({"from": "exact"})));
        assert_eq!(table.lookup("/api/other"), Some(&json!({"from": "glob"})));
    }

    #[test]
    fn test_first_registered_glob_wins() {
        let mut table = MockTable::new();
        table.insert("/users/:id", json!(1)).unwrap();
        table.insert("/users/*", json!(2)).unwrap();
        assert_eq!(table.lookup("/users/9"), Some(&json!(1)));
    }

    #[test]
    fn test_reregistering_replaces_in_place() {
        let mut table = MockTable::new();
        table.insert("/users/:id", json!("old")).unwrap();
        table.insert("/users/*", json!("other")).unwrap();
        table.insert("/users/:id", json!("new")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("/users/9"), Some(&json!("new")));
        assert_eq!(
            table.patterns().collect::<Vec<_>>(),
            vec!["/users/:id", "/users/*"]
        );
    }

    #[test]
    fn test_no_match_and_clear() {
        let mut table = MockTable::new();
        table.insert("/api/me", json!({})).unwrap();
        assert!(table.lookup("/api/you").is_none());

        table.clear();
        assert!(table.is_empty());
        assert!(table.lookup("/api/me").is_none());
    }
}
