//! Lorebook selection.
//!
//! Builds the scan context from recent history, matches entries against it
//! (optionally recursively), orders the hits by priority and trims them to the
//! token budget.

use std::cmp::Reverse;

use parley_types::config::LorebookDefaults;
use parley_types::lorebook::{Lorebook, LorebookEntry, LorebookScanOverrides};
use parley_types::message::Message;
use tracing::debug;

use super::matcher::{CompiledEntry, ScanText};
use crate::llm::token_counter::TokenCounter;

/// Effective scan parameters for one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub scan_depth: usize,
    pub token_budget: u32,
    pub recursive_scanning: bool,
}

impl ScanSettings {
    /// Per-call override, then lorebook setting, then global default,
    /// independently for each parameter.
    pub fn resolve(
        overrides: &LorebookScanOverrides,
        lorebook: &Lorebook,
        defaults: &LorebookDefaults,
    ) -> Self {
        Self {
            scan_depth: overrides
                .scan_depth
                .or(lorebook.scan_depth)
                .unwrap_or(defaults.scan_depth),
            token_budget: overrides
                .token_budget
                .or(lorebook.token_budget)
                .unwrap_or(defaults.token_budget),
            recursive_scanning: overrides
                .recursive_scanning
                .or(lorebook.recursive_scanning)
                .unwrap_or(defaults.recursive_scanning),
        }
    }
}

/// Text of the last `depth` user/assistant messages, oldest first.
pub fn scan_context(history: &[Message], depth: usize) -> ScanText {
    let recent: Vec<String> = history
        .iter()
        .rev()
        .filter(|m| matches!(m, Message::User(_) | Message::Assistant(_)))
        .take(depth)
        .map(Message::text)
        .collect();

    let mut text = ScanText::default();
    for message in recent.iter().rev() {
        text.push(message);
    }
    text
}

pub struct LorebookSelector<C: TokenCounter> {
    defaults: LorebookDefaults,
    counter: C,
}

impl<C: TokenCounter> LorebookSelector<C> {
    pub fn new(defaults: LorebookDefaults, counter: C) -> Self {
        Self { defaults, counter }
    }

    pub fn defaults(&self) -> &LorebookDefaults {
        &self.defaults
    }

    /// Select the entries to inject for the given history.
    ///
    /// The result is ordered by priority (highest first, ties in lorebook
    /// order) and fits the token budget unless nothing would.
    pub fn select<'a>(
        &self,
        lorebook: &'a Lorebook,
        history: &[Message],
        overrides: &LorebookScanOverrides,
    ) -> Vec<&'a LorebookEntry> {
        let settings = ScanSettings::resolve(overrides, lorebook, &self.defaults);
        let mut context = scan_context(history, settings.scan_depth);

        let candidates: Vec<CompiledEntry<'a>> = lorebook
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.enabled && !entry.content.trim().is_empty())
            .map(|(index, entry)| CompiledEntry::compile(entry, index))
            .collect();

        let mut taken = vec![false; candidates.len()];
        let mut selected: Vec<&CompiledEntry<'a>> = Vec::new();
        let mut pass = 0usize;
        loop {
            pass += 1;
            let mut found = 0usize;
            for (slot, candidate) in candidates.iter().enumerate() {
                if taken[slot] || !candidate.matches(&context) {
                    continue;
                }
                taken[slot] = true;
                selected.push(candidate);
                found += 1;
                if settings.recursive_scanning {
                    context.push(&candidate.entry.content);
                }
            }
            if !settings.recursive_scanning || found == 0 {
                break;
            }
        }

        selected.sort_by_key(|c| (Reverse(c.entry.priority.unwrap_or(i32::MIN)), c.index));
        let mut entries: Vec<&'a LorebookEntry> = selected.iter().map(|c| c.entry).collect();

        let mut total: u64 = entries
            .iter()
            .map(|e| u64::from(self.counter.count_text(&e.content)))
            .sum();
        while total > u64::from(settings.token_budget) {
            let Some(dropped) = entries.pop() else {
                break;
            };
            total -= u64::from(self.counter.count_text(&dropped.content));
        }

        debug!(
            candidates = candidates.len(),
            selected = entries.len(),
            passes = pass,
            tokens = total,
            budget = settings.token_budget,
            "lorebook selection"
        );
        entries
    }
}
