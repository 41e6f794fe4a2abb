//! `parley lorebook select`: show which entries a history would pull in.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use parley_core::llm::token_counter::{ApproxTokenCounter, TokenCounter};
use parley_core::lorebook::placement::{LorePlacement, render_lore};
use parley_core::lorebook::selector::{LorebookSelector, ScanSettings};
use parley_types::lorebook::{Lorebook, LorebookEntry, LorebookScanOverrides};
use parley_types::message::Message;

use crate::state::AppState;

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a valid {what}", path.display()))
}

pub async fn select_entries(
    state: &AppState,
    lorebook_path: &Path,
    history_path: &Path,
    overrides: LorebookScanOverrides,
    json: bool,
) -> Result<()> {
    let lorebook: Lorebook = read_json(lorebook_path, "lorebook").await?;
    let history: Vec<Message> = read_json(history_path, "message history").await?;

    let settings = ScanSettings::resolve(&overrides, &lorebook, &state.config.lorebook);
    let selector = LorebookSelector::new(state.config.lorebook, ApproxTokenCounter);
    let selected = selector.select(&lorebook, &history, &overrides);
    let placement = LorePlacement::from_selection(&selected);

    if json {
        let body = serde_json::json!({
            "scan_depth": settings.scan_depth,
            "token_budget": settings.token_budget,
            "recursive_scanning": settings.recursive_scanning,
            "selected": selected,
            "before_character": render_lore(&placement.before_character),
            "after_character": render_lore(&placement.after_character),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} of {} entries selected (depth {}, budget {}, recursive {})",
        style("📖").bold(),
        style(selected.len()).cyan().bold(),
        lorebook.entries.len(),
        settings.scan_depth,
        settings.token_budget,
        settings.recursive_scanning
    );

    if placement.is_empty() {
        println!();
        println!("  {} Nothing matched.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    print_group("Before character", &placement.before_character);
    print_group("After character", &placement.after_character);
    println!();
    Ok(())
}

fn print_group(label: &str, entries: &[&LorebookEntry]) {
    if entries.is_empty() {
        return;
    }
    println!();
    println!("  {}", style(label).bold());
    for entry in entries {
        let name = entry
            .comment
            .as_deref()
            .or_else(|| entry.keys.first().map(String::as_str))
            .unwrap_or("(constant)");
        let priority = entry
            .priority
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        println!(
            "  {} {} {}",
            style("│").dim(),
            style(name).cyan(),
            style(format!(
                "priority {priority}, ~{} tokens",
                ApproxTokenCounter.count_text(&entry.content)
            ))
            .dim()
        );
    }
}
