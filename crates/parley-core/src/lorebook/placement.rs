//! Splits a lorebook selection around the character definition.

use parley_types::lorebook::{EntryPosition, LorebookEntry};

/// Selected entries grouped by where they are injected.
///
/// Each group is reversed relative to selection order, so the highest-priority
/// entry ends up closest to the character definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LorePlacement<'a> {
    pub before_character: Vec<&'a LorebookEntry>,
    pub after_character: Vec<&'a LorebookEntry>,
}

impl<'a> LorePlacement<'a> {
    pub fn from_selection(selected: &[&'a LorebookEntry]) -> Self {
        let mut placement = Self::default();
        for entry in selected.iter().rev() {
            match entry.position {
                EntryPosition::BeforeCharacter => placement.before_character.push(*entry),
                EntryPosition::AfterCharacter => placement.after_character.push(*entry),
            }
        }
        placement
    }

    pub fn is_empty(&self) -> bool {
        self.before_character.is_empty() && self.after_character.is_empty()
    }
}

/// Join entry contents with blank lines.
pub fn render_lore(entries: &[&LorebookEntry]) -> String {
    entries
        .iter()
        .map(|e| e.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_split_and_reversed() {
        let a = LorebookEntry::new("a", &["k"]);
        let b = LorebookEntry::new("b", &["k"]).at(EntryPosition::AfterCharacter);
        let c = LorebookEntry::new("c", &["k"]);
        let d = LorebookEntry::new("d", &["k"]).at(EntryPosition::AfterCharacter);

        let placement = LorePlacement::from_selection(&[&a, &b, &c, &d]);
        let before: Vec<&str> = placement.before_character.iter().map(|e| e.content.as_str()).collect();
        let after: Vec<&str> = placement.after_character.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(before, vec!["c", "a"]);
        assert_eq!(after, vec!["d", "b"]);
    }

    #[test]
    fn render_joins_with_blank_lines() {
        let a = LorebookEntry::new("first\n", &[]);
        let b = LorebookEntry::new("second", &[]);
        assert_eq!(render_lore(&[&a, &b]), "first\n\nsecond");
        assert_eq!(render_lore(&[]), "");
        assert!(LorePlacement::from_selection(&[]).is_empty());
    }
}
