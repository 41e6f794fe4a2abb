//! System prompt assembly.

use parley_types::lorebook::LorebookEntry;

use crate::lorebook::placement::{LorePlacement, render_lore};
use crate::lorebook::tags::substitute_tags;

/// Who is talking, for `{{char}}` / `{{user}}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Character definition placed between the two lore groups.
    pub system_prompt: String,
    pub char_name: String,
    pub user_name: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            char_name: "Assistant".to_string(),
            user_name: "User".to_string(),
        }
    }
}

/// Build the system prompt: before-character lore, the character definition,
/// then after-character lore. Returns `None` when there is nothing to say.
pub fn compose_system_prompt(persona: &Persona, selected: &[&LorebookEntry]) -> Option<String> {
    let placement = LorePlacement::from_selection(selected);
    let sections = [
        render_lore(&placement.before_character),
        persona.system_prompt.trim().to_string(),
        render_lore(&placement.after_character),
    ];
    let prompt = sections
        .iter()
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n");
    if prompt.is_empty() {
        return None;
    }
    Some(substitute_tags(&prompt, &persona.char_name, &persona.user_name))
}
