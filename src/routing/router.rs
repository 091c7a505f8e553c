//! Rule lookup.
//!
//! # Responsibilities
//! - Store the rule table in declaration order
//! - Look up the rule for a request path
//! - Return matched rule or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Exact equality on the path component; the query string is ignored
//! - O(n) scan so the first declared rule wins under duplicate paths

use crate::config::RuleConfig;

/// Ordered, immutable routing table.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<RuleConfig>,
}

impl RuleTable {
    pub fn new(rules: Vec<RuleConfig>) -> Self {
        let table = Self { rules };
        for (index, rule) in table.rules.iter().enumerate() {
            if table.position(&rule.path) != Some(index) {
                tracing::warn!(path = %rule.path, index, "Rule shadowed by an earlier rule with the same path");
            }
        }
        table
    }

    /// First rule whose path equals the path component of `target`.
    pub fn find(&self, target: &str) -> Option<&RuleConfig> {
        let path = path_of(target);
        self.rules.iter().find(|rule| rule.path == path)
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.path == path)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Strip the query string from a request target.
pub fn path_of(target: &str) -> &str {
    match target.split_once('?') {
        Some((path, _)) => path,
        None => target,
    }
}
