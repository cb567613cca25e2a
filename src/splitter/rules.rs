use super::Splitter;
use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use std::path::Path;

const PYTHON: &str = include_str!("../../rules/python.json");
const JAVA: &str = include_str!("../../rules/java.json");

/// Built-in tables, keyed by the file they were embedded from.
pub(super) const BUILTIN: &[(&str, &str)] = &[("rules/python.json", PYTHON), ("rules/java.json", JAVA)];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One runtime family's classification table, as stored on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitRules {
    pub token: String,
    #[serde(default)]
    pub description: String,
    /// Prefixes owned by the runtime installation.
    pub base_paths: Vec<String>,
    /// Prefixes that hold application content even inside a base prefix.
    #[serde(default)]
    pub application_paths: Vec<String>,
}

/// A [`Splitter`] driven entirely by a [`SplitRules`] table.
#[derive(Debug, Clone)]
pub struct RuleSplitter {
    rules: SplitRules,
    base: Vec<Pattern>,
    application: Vec<Pattern>,
}

impl RuleSplitter {
    pub fn new(rules: SplitRules, origin: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRules {
            origin: origin.to_string(),
            reason,
        };

        if rules.token.trim().is_empty() {
            return Err(invalid("empty token".to_string()));
        }

        let compile = |patterns: &[String]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| {
                    if !p.starts_with('/') {
                        return Err(invalid(format!("pattern '{}' is not absolute", p)));
                    }
                    let trimmed = if p.len() > 1 { p.trim_end_matches('/') } else { p };
                    Pattern::new(trimmed).map_err(|e| invalid(format!("pattern '{}': {}", p, e)))
                })
                .collect()
        };

        let base = compile(&rules.base_paths)?;
        let application = compile(&rules.application_paths)?;

        Ok(Self {
            rules,
            base,
            application,
        })
    }

    pub fn from_json(json: &str, origin: &str) -> Result<Self> {
        let rules: SplitRules = serde_json::from_str(json).map_err(|e| Error::InvalidRules {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        Self::new(rules, origin)
    }

    /// Loads a custom table, e.g. one passed with `--rules`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let json = std::fs::read_to_string(path).map_err(|e| Error::InvalidRules {
            origin: origin.clone(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json, &origin)
    }

    pub fn rules(&self) -> &SplitRules {
        &self.rules
    }
}

/// Whether `path` or one of its ancestors matches any pattern.
fn under_any(patterns: &[Pattern], path: &Path) -> bool {
    path.ancestors().any(|ancestor| {
        patterns
            .iter()
            .any(|p| p.matches_path_with(ancestor, MATCH_OPTIONS))
    })
}

impl Splitter for RuleSplitter {
    fn token(&self) -> &str {
        &self.rules.token
    }

    fn is_application(&self, path: &Path) -> bool {
        under_any(&self.application, path) || !under_any(&self.base, path)
    }
}
