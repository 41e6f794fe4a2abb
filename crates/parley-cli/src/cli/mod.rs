//! CLI command definitions for the `parley` binary.
//!
//! Commands operate on the file-backed conversation store under the data
//! directory. Nothing here talks to a model.

pub mod conversation;
pub mod lorebook;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and maintain Parley conversation stores.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory (defaults to ~/.parley).
    #[arg(long, global = true, env = "PARLEY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List conversations, most recently updated first.
    #[command(alias = "ls")]
    List,

    /// Create an empty conversation.
    New {
        /// Optional title.
        #[arg(long)]
        title: Option<String>,
    },

    /// Show a conversation's metadata and transcript.
    Show {
        /// Conversation id.
        id: String,
    },

    /// Print the raw event log of a conversation.
    Events {
        /// Conversation id.
        id: String,
    },

    /// Move the read cursor of a conversation.
    Read {
        /// Conversation id.
        id: String,

        /// Transcript index to mark as read (defaults to the last item).
        #[arg(long)]
        index: Option<usize>,
    },

    /// Delete a conversation and its event log.
    #[command(alias = "rm")]
    Delete {
        /// Conversation id.
        id: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Summary index maintenance.
    Index {
        #[command(subcommand)]
        action: IndexCommand,
    },

    /// Lorebook tools.
    Lorebook {
        #[command(subcommand)]
        action: LorebookCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum IndexCommand {
    /// Rebuild index.json by scanning every conversation directory.
    Rebuild,
}

#[derive(Subcommand)]
pub enum LorebookCommand {
    /// Dry-run entry selection against a message history.
    Select {
        /// Lorebook JSON file.
        lorebook: PathBuf,

        /// JSON file holding an array of messages.
        #[arg(long)]
        history: PathBuf,

        /// Number of trailing messages to scan.
        #[arg(long)]
        scan_depth: Option<usize>,

        /// Token budget for injected entries.
        #[arg(long)]
        token_budget: Option<u32>,

        /// Let selected entries trigger further entries.
        #[arg(long)]
        recursive: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["parley", "list", "-vv", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn parses_read_with_index() {
        let cli = Cli::try_parse_from(["parley", "read", "abc", "--index", "3"]).unwrap();
        match cli.command {
            Commands::Read { id, index } => {
                assert_eq!(id, "abc");
                assert_eq!(index, Some(3));
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn parses_lorebook_select() {
        let cli = Cli::try_parse_from([
            "parley",
            "lorebook",
            "select",
            "book.json",
            "--history",
            "chat.json",
            "--token-budget",
            "64",
            "--recursive",
        ])
        .unwrap();
        match cli.command {
            Commands::Lorebook {
                action:
                    LorebookCommand::Select {
                        lorebook,
                        history,
                        scan_depth,
                        token_budget,
                        recursive,
                    },
            } => {
                assert_eq!(lorebook, PathBuf::from("book.json"));
                assert_eq!(history, PathBuf::from("chat.json"));
                assert_eq!(scan_depth, None);
                assert_eq!(token_budget, Some(64));
                assert!(recursive);
            }
            _ => panic!("expected lorebook select"),
        }
    }

    #[test]
    fn delete_requires_id() {
        assert!(Cli::try_parse_from(["parley", "delete"]).is_err());
    }
}
