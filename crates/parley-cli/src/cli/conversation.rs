//! Conversation management commands: list, new, show, events, read, delete,
//! index rebuild.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use parley_types::conversation::{ConversationId, ConversationSummary};
use parley_types::event::{ConversationEvent, EventKind, Participant};

use crate::state::AppState;

fn parse_id(id: &str) -> Result<ConversationId> {
    id.parse::<ConversationId>()
        .with_context(|| format!("'{id}' is not a valid conversation id"))
}

pub async fn list_conversations(state: &AppState, json: bool) -> Result<()> {
    let summaries = state.log.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!(
            "  {} No conversations in {}",
            style("i").blue().bold(),
            style(state.data_dir.display()).dim()
        );
        println!();
        return Ok(());
    }

    print_summary_table(&summaries);
    Ok(())
}

fn print_summary_table(summaries: &[ConversationSummary]) {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Events").fg(Color::White),
        Cell::new("Unread").fg(Color::White),
        Cell::new("Preview").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for summary in summaries {
        let unread = if summary.unread_count > 0 {
            Cell::new(format!("● {}", summary.unread_count)).fg(Color::Green)
        } else {
            Cell::new("-").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(summary.id).fg(Color::Cyan),
            Cell::new(summary.title.as_deref().unwrap_or("(untitled)")),
            Cell::new(summary.event_count),
            unread,
            Cell::new(truncate(summary.preview.as_deref().unwrap_or(""), 50)),
            Cell::new(format_relative_time(&summary.updated_at)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
}

pub async fn new_conversation(state: &AppState, title: Option<String>, json: bool) -> Result<()> {
    let conversation = state.log.create(title).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Created conversation {}",
        style("✓").green().bold(),
        style(conversation.id).cyan()
    );
    println!();
    Ok(())
}

pub async fn show_conversation(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let conversation = state.log.get(&id).await?;
    let events = state.log.read(&id).await?;

    if json {
        let body = serde_json::json!({
            "conversation": conversation,
            "events": events,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(conversation.title.as_deref().unwrap_or("(untitled)"))
            .bold()
            .cyan(),
        style(format!("({})", conversation.id)).dim()
    );
    println!(
        "  {} created {}, updated {}",
        style("│").dim(),
        conversation.created_at.format("%Y-%m-%d %H:%M"),
        format_relative_time(&conversation.updated_at)
    );
    println!(
        "  {} {} events, {} transcript items, {} unread",
        style("│").dim(),
        conversation.event_count,
        conversation.view_item_count,
        conversation.unread_count
    );
    println!();

    let mut view_index = 0usize;
    for event in events.iter().filter(|e| e.is_view_item()) {
        let unread = conversation
            .last_read_index
            .is_none_or(|read| view_index > read);
        let marker = if unread {
            style("●").green().to_string()
        } else {
            " ".to_string()
        };
        println!("  {marker} {}", render_event(event));
        view_index += 1;
    }
    println!();
    Ok(())
}

pub async fn print_events(state: &AppState, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let events = state.log.read(&id).await?;
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

pub async fn mark_read(state: &AppState, id: &str, index: Option<usize>, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let conversation = state
        .log
        .mark_read(&id, index.unwrap_or(usize::MAX))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    let cursor = conversation
        .last_read_index
        .map_or_else(|| "none".to_string(), |i| i.to_string());
    println!(
        "  {} Read cursor at {}, {} unread",
        style("✓").green().bold(),
        style(cursor).cyan(),
        conversation.unread_count
    );
    Ok(())
}

pub async fn delete_conversation(state: &AppState, id: &str, force: bool, json: bool) -> Result<()> {
    let id = parse_id(id)?;
    let conversation = state.log.get(&id).await?;

    if !force && !json {
        let name = conversation
            .title
            .clone()
            .unwrap_or_else(|| conversation.id.to_string());
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete conversation '{}' and its {} events?",
                style(name).red().bold(),
                conversation.event_count
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.log.delete(&id).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "deleted": id }))?
        );
    } else {
        println!("  {} Deleted {}", style("✓").green().bold(), style(id).cyan());
    }
    Ok(())
}

pub async fn rebuild_index(state: &AppState, json: bool) -> Result<()> {
    let summaries = state
        .log
        .rebuild_index()
        .await
        .context("failed to rebuild conversation index")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!(
        "  {} Indexed {} conversation(s)",
        style("✓").green().bold(),
        summaries.len()
    );
    Ok(())
}

fn render_event(event: &ConversationEvent) -> String {
    let who = match event.source {
        Participant::User => style("you").yellow().bold(),
        Participant::Assistant => style("assistant").cyan().bold(),
        Participant::Tool => style("tool").magenta().bold(),
        Participant::System => style("system").dim().bold(),
    };

    let body = match &event.kind {
        EventKind::ToolUseNotification { call, result } => {
            let status = if result.is_success() {
                style("ok").green()
            } else {
                style("failed").red()
            };
            format!("{} [{status}] {}", call.name, truncate(&result.to_model_text(), 80))
        }
        _ => event.preview_text().unwrap_or_default(),
    };

    format!("{who}: {body}")
}

fn truncate(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max_chars {
        let kept: String = line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    } else if line.len() < text.len() {
        format!("{line}...")
    } else {
        line.to_string()
    }
}

fn format_relative_time(dt: &chrono::DateTime<chrono::Utc>) -> String {
    let diff = chrono::Utc::now() - *dt;

    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else if diff.num_days() < 30 {
        format!("{}d ago", diff.num_days())
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_single_lines() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_cuts_long_lines_on_char_boundaries() {
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }

    #[test]
    fn truncate_marks_dropped_lines() {
        assert_eq!(truncate("first\nsecond", 50), "first...");
    }

    #[test]
    fn relative_time_formats() {
        let now = chrono::Utc::now();
        assert_eq!(format_relative_time(&now), "just now");
        assert_eq!(
            format_relative_time(&(now - chrono::Duration::minutes(5))),
            "5m ago"
        );
        assert_eq!(
            format_relative_time(&(now - chrono::Duration::days(3))),
            "3d ago"
        );
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = ConversationId::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
