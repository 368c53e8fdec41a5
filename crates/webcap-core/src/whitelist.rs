//! URL whitelist gating which resources may be captured.
//!
//! Rules are plain substrings matched against the raw absolute URL. Lines
//! prefixed with `!` deny, a lone `*` allows everything that is not denied,
//! and any other line allows URLs containing it.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Pattern that allows every URL not rejected by a deny rule.
pub const ALLOW_ALL: &str = "*";

/// Whether a rule admits or rejects matching URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSense {
    Allow,
    Deny,
}

/// One whitelist line: a substring pattern plus its sense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistRule {
    pub pattern: String,
    pub sense: RuleSense,
}

impl WhitelistRule {
    /// Parses a single trimmed, non-comment line.
    pub fn parse(line: &str) -> Self {
        match line.strip_prefix('!') {
            Some(rest) => WhitelistRule {
                pattern: rest.to_string(),
                sense: RuleSense::Deny,
            },
            None => WhitelistRule {
                pattern: line.to_string(),
                sense: RuleSense::Allow,
            },
        }
    }

    fn is_allow_all(&self) -> bool {
        self.sense == RuleSense::Allow && self.pattern == ALLOW_ALL
    }

    fn matches(&self, url: &str) -> bool {
        url.contains(self.pattern.as_str())
    }
}

/// Ordered set of whitelist rules, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    rules: Vec<WhitelistRule>,
}

impl Whitelist {
    pub fn new(rules: Vec<WhitelistRule>) -> Self {
        Whitelist { rules }
    }

    /// Builds a whitelist from raw lines (e.g. `["*", "!ads.example.com"]`).
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = lines
            .into_iter()
            .filter_map(|line| {
                let line = line.as_ref().trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(WhitelistRule::parse(line))
                }
            })
            .collect();
        Whitelist { rules }
    }

    /// Parses the line-oriented whitelist file format (handles `\r\n`).
    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Loads the whitelist file. A missing file yields an empty whitelist,
    /// which rejects every URL.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "whitelist {} not found; nothing will be captured",
                path.display()
            );
            return Ok(Whitelist::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read whitelist {}", path.display()))?;
        let whitelist = Self::parse(&text);
        tracing::info!(rules = whitelist.rules.len(), "whitelist loaded from {}", path.display());
        Ok(whitelist)
    }

    pub fn rules(&self) -> &[WhitelistRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Deny rules win over everything, then the `*` sentinel, then allow rules.
    pub fn is_allowed(&self, url: &str) -> bool {
        let denied = self
            .rules
            .iter()
            .any(|r| r.sense == RuleSense::Deny && r.matches(url));
        if denied {
            return false;
        }

        if self.rules.iter().any(WhitelistRule::is_allow_all) {
            return true;
        }

        self.rules
            .iter()
            .any(|r| r.sense == RuleSense::Allow && r.matches(url))
    }
}
