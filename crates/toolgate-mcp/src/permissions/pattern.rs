//! Wildcard tool-name patterns.
//!
//! `*` matches any run of characters (including none). Every other
//! character is literal. Matching is anchored and case-insensitive.

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// A compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Option<Regex>,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Self {
        let regex = match RegexBuilder::new(&wildcard_to_regex(pattern))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
        {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern, error = %e, "Invalid permission pattern; it will never match");
                None
            }
        };

        Self {
            source: pattern.to_string(),
            regex,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `tool_name` matches. Invalid patterns never match.
    pub fn matches(&self, tool_name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(tool_name))
    }
}

/// Escape everything except `*`, which becomes `.*`.
fn wildcard_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}
