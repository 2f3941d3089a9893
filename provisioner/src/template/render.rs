//! `{{name}}` placeholder substitution

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::ProvisionError;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

/// Template text with `{{name}}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every placeholder name referenced by the template
    pub fn placeholders(&self) -> BTreeSet<&str> {
        PLACEHOLDER_RE
            .captures_iter(&self.source)
            .filter_map(|caps| caps.get(1))
            .map(|name| name.as_str())
            .collect()
    }

    /// Substitute every placeholder in one pass. Values are inserted
    /// literally and never scanned for placeholders themselves.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String, ProvisionError> {
        let missing: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter(|name| !vars.contains_key(*name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ProvisionError::MissingVariable(missing));
        }

        let rendered = PLACEHOLDER_RE.replace_all(&self.source, |caps: &Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}
