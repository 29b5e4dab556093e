//! VM annotation parsing.
//!
//! VMs created by the owning cloud platform carry their identity in the
//! free-text annotation field as `key:value` lines, e.g.
//!
//! ```text
//! name:web01
//! projectid:0f3c2a
//! ```
//!
//! Each line is split at its last colon, so keys may contain colons but values
//! may not: `name:web:server01` yields key `name:web` and value `server01`.

use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Keys that must be present for a VM to be sampled.
pub const REQUIRED_KEYS: [&str; 2] = ["name", "projectid"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("annotation line {line} has no ':' separator")]
    MissingSeparator { line: usize },

    #[error("annotation lacks required key '{0}'")]
    MissingKey(&'static str),
}

/// Parsed annotation fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    fields: BTreeMap<String, String>,
}

impl Annotation {
    pub fn parse(text: &str) -> Result<Self, AnnotationError> {
        let mut fields = BTreeMap::new();

        for (idx, raw) in text.split('\n').enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .rsplit_once(':')
                .ok_or(AnnotationError::MissingSeparator { line: idx + 1 })?;
            fields.insert(key.to_string(), value.to_string());
        }

        for key in REQUIRED_KEYS {
            if !fields.contains_key(key) {
                return Err(AnnotationError::MissingKey(key));
            }
        }

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Owner-assigned VM name.
    pub fn name(&self) -> &str {
        self.get("name").unwrap_or_default()
    }

    pub fn project_id(&self) -> &str {
        self.get("projectid").unwrap_or_default()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Decides whether an annotation belongs to a VM managed by the owning
/// platform. The marker must match at the very start of the text.
#[derive(Debug, Clone)]
pub struct AnnotationFilter {
    marker: Regex,
}

impl AnnotationFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            marker: Regex::new(pattern)?,
        })
    }

    pub fn is_managed(&self, text: &str) -> bool {
        self.marker.find(text).is_some_and(|m| m.start() == 0)
    }
}
