//! `{{char}}` / `{{user}}` placeholder substitution.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

static CHAR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{char\}\}").expect("valid char tag pattern"));

static USER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\{\{user\}\}").expect("valid user tag pattern"));

/// Replace the character and user placeholders, ignoring case.
pub fn substitute_tags(text: &str, char_name: &str, user_name: &str) -> String {
    let with_char = CHAR_TAG.replace_all(text, NoExpand(char_name));
    USER_TAG
        .replace_all(&with_char, NoExpand(user_name))
        .into_owned()
}
