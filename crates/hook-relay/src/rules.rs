//! Routing rules parsed from the webhook URL's query string.
//!
//! Each query key is a comma-separated list of selectors and its value is the
//! destination for all of them:
//!
//! ```text
//! ?b:master,l:team/backend=https://hook.example.com/backend
//! ```
//!
//! `b:` selects a branch, `l:` selects a label. Anything else is ignored.

use std::collections::BTreeMap;

const BRANCH_PREFIX: &str = "b:";
const LABEL_PREFIX: &str = "l:";

/// A single selector parsed from a query key token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Branch(String),
    Label(String),
}

impl Selector {
    /// Parse one token. Returns `None` for tokens without a known prefix.
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(branch) = token.strip_prefix(BRANCH_PREFIX) {
            Some(Selector::Branch(branch.to_string()))
        } else {
            token
                .strip_prefix(LABEL_PREFIX)
                .map(|label| Selector::Label(label.to_string()))
        }
    }
}

/// Branch and label routing tables for one request.
///
/// Built once per inbound request and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    branches: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
}

impl RuleSet {
    /// Parse a raw (still percent-encoded) query string, without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned())),
        )
    }

    /// Build a rule set from decoded `(key, value)` pairs in request order.
    ///
    /// Only the first value of a repeated key is used. Across different keys
    /// naming the same selector, the later key wins. Empty values contribute
    /// nothing.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut keys: Vec<(String, String)> = Vec::new();
        for (key, value) in pairs {
            if keys.iter().any(|(seen, _)| *seen == key) {
                continue;
            }
            keys.push((key, value));
        }

        let mut rules = RuleSet::default();
        for (key, destination) in keys {
            if destination.is_empty() {
                continue;
            }
            for selector in key.split(',').filter_map(Selector::parse) {
                rules.insert(selector, destination.clone());
            }
        }
        rules
    }

    /// Add or replace the destination for a selector.
    pub fn insert(&mut self, selector: Selector, destination: String) {
        match selector {
            Selector::Branch(name) => self.branches.insert(name, destination),
            Selector::Label(name) => self.labels.insert(name, destination),
        };
    }

    pub fn branch(&self, name: &str) -> Option<&str> {
        self.branches.get(name).map(String::as_str)
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Every branch destination, in branch-name order. Duplicates are kept.
    pub fn branch_destinations(&self) -> Vec<String> {
        self.branches.values().cloned().collect()
    }

    /// Every label destination, in label-name order. Duplicates are kept.
    pub fn label_destinations(&self) -> Vec<String> {
        self.labels.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.labels.is_empty()
    }
}
