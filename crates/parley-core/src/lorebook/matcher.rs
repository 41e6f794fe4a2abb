//! Key matching for lorebook entries.

use parley_types::lorebook::LorebookEntry;
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Scan context with a lowercase copy for case-insensitive key lookups.
#[derive(Debug, Clone, Default)]
pub struct ScanText {
    raw: String,
    lower: String,
}

impl ScanText {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let lower = raw.to_lowercase();
        Self { raw, lower }
    }

    /// Append another block of text on its own line.
    pub fn push(&mut self, text: &str) {
        if !self.raw.is_empty() {
            self.raw.push('\n');
            self.lower.push('\n');
        }
        self.raw.push_str(text);
        self.lower.push_str(&text.to_lowercase());
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn contains(&self, key: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            self.raw.contains(key)
        } else {
            self.lower.contains(&key.to_lowercase())
        }
    }
}

/// An entry paired with its compiled pattern, if it uses one.
#[derive(Debug)]
pub struct CompiledEntry<'a> {
    pub entry: &'a LorebookEntry,
    /// Position in the lorebook, used to break priority ties.
    pub index: usize,
    pattern: Option<Regex>,
}

impl<'a> CompiledEntry<'a> {
    pub fn compile(entry: &'a LorebookEntry, index: usize) -> Self {
        let pattern = if entry.use_regex {
            compile_pattern(entry)
        } else {
            None
        };
        Self {
            entry,
            index,
            pattern,
        }
    }

    pub fn matches(&self, context: &ScanText) -> bool {
        let entry = self.entry;
        if entry.use_regex {
            return self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(context.as_str()));
        }
        if entry.constant {
            return true;
        }

        if !any_key(&entry.keys, context, entry.case_sensitive) {
            return false;
        }
        if entry.selective && !entry.secondary_keys.is_empty() {
            return any_key(&entry.secondary_keys, context, entry.case_sensitive);
        }
        true
    }
}

fn any_key(keys: &[String], context: &ScanText, case_sensitive: bool) -> bool {
    keys.iter()
        .filter(|key| !key.trim().is_empty())
        .any(|key| context.contains(key, case_sensitive))
}

/// Only the first primary key is used as the pattern.
fn compile_pattern(entry: &LorebookEntry) -> Option<Regex> {
    let source = entry.keys.first()?;
    match RegexBuilder::new(source)
        .case_insensitive(!entry.case_sensitive)
        .build()
    {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            debug!(pattern = %source, error = %err, "invalid lorebook pattern; entry never matches");
            None
        }
    }
}
