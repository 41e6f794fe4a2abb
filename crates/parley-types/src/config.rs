//! Engine configuration types for Parley.
//!
//! `EngineConfig` represents the `config.toml` that controls memory bounds,
//! lorebook scanning defaults, and turn limits. Every field has a default so
//! an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level configuration for the conversation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub lorebook: LorebookDefaults,
    #[serde(default)]
    pub engine: TurnConfig,
}

/// Which chat memory variant a conversation uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    #[default]
    MessageWindow,
    TokenWindow,
    Oblivious,
}

impl fmt::Display for MemoryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryStrategy::MessageWindow => write!(f, "message_window"),
            MemoryStrategy::TokenWindow => write!(f, "token_window"),
            MemoryStrategy::Oblivious => write!(f, "oblivious"),
        }
    }
}

impl FromStr for MemoryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "message_window" => Ok(MemoryStrategy::MessageWindow),
            "token_window" => Ok(MemoryStrategy::TokenWindow),
            "oblivious" => Ok(MemoryStrategy::Oblivious),
            other => Err(format!("invalid memory strategy: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub strategy: MemoryStrategy,
    /// Capacity for the message-window policy.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Budget for the token-window policy.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_messages() -> usize {
    100
}

fn default_max_tokens() -> u32 {
    16_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            strategy: MemoryStrategy::default(),
            max_messages: default_max_messages(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Global fallbacks for lorebook scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorebookDefaults {
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
    #[serde(default = "default_lore_token_budget")]
    pub token_budget: u32,
    #[serde(default)]
    pub recursive_scanning: bool,
}

fn default_scan_depth() -> usize {
    4
}

fn default_lore_token_budget() -> u32 {
    2048
}

impl Default for LorebookDefaults {
    fn default() -> Self {
        Self {
            scan_depth: default_scan_depth(),
            token_budget: default_lore_token_budget(),
            recursive_scanning: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Tool-execution rounds allowed within one turn before it is aborted.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_max_tool_rounds() -> u32 {
    16
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.memory.strategy, MemoryStrategy::MessageWindow);
        assert_eq!(config.memory.max_messages, 100);
        assert_eq!(config.memory.max_tokens, 16_000);
        assert_eq!(config.lorebook.scan_depth, 4);
        assert_eq!(config.lorebook.token_budget, 2048);
        assert!(!config.lorebook.recursive_scanning);
        assert_eq!(config.engine.max_tool_rounds, 16);
    }

    #[test]
    fn test_engine_config_deserialize_empty() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
[memory]
strategy = "token_window"
max_tokens = 8000

[lorebook]
scan_depth = 10
recursive_scanning = true
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.strategy, MemoryStrategy::TokenWindow);
        assert_eq!(config.memory.max_tokens, 8000);
        assert_eq!(config.memory.max_messages, 100);
        assert_eq!(config.lorebook.scan_depth, 10);
        assert_eq!(config.lorebook.token_budget, 2048);
        assert!(config.lorebook.recursive_scanning);
    }

    #[test]
    fn test_memory_strategy_roundtrip() {
        for strategy in [
            MemoryStrategy::MessageWindow,
            MemoryStrategy::TokenWindow,
            MemoryStrategy::Oblivious,
        ] {
            let parsed: MemoryStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(strategy, parsed);
        }
    }
}
