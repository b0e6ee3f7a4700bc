// ABOUTME: Rendering of stream events and conversation listings for the terminal
// ABOUTME: NDJSON for machine consumers, colored text and tables for people

use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use specforge_core::{truncate, ConversationMetadata, ConversationStatus};
use specforge_generator::{QualityReport, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Ndjson,
    /// Human-readable progress, spec printed at the end
    Pretty,
}

/// Render one event; NDJSON output never spans more than one line
pub fn render_event(event: &StreamEvent, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Ndjson => serde_json::to_string(event),
        OutputFormat::Pretty => Ok(render_pretty(event)),
    }
}

fn render_pretty(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Conversation {
            conversation_id,
            status,
            message_count,
        } => format!(
            "{} {} ({}, {} messages)",
            "Conversation".blue().bold(),
            conversation_id.cyan(),
            status_label(*status),
            message_count
        ),
        StreamEvent::Status { stage, message } => {
            format!("{} {}", format!("[{}]", stage).dimmed(), message)
        }
        StreamEvent::Question {
            question,
            options,
            default,
            ..
        } => {
            let mut out = format!("{} {}", "?".yellow().bold(), question);
            if !options.is_empty() {
                out.push_str(&format!(" [{}]", options.join(" / ")));
            }
            if let Some(default) = default {
                out.push_str(&format!(" (default: {})", default));
            }
            out
        }
        StreamEvent::Diff {
            summary, preview, ..
        } => {
            let lines: Vec<String> = preview.lines().map(color_diff_line).collect();
            format!("{} {}\n{}", "Changes:".bold(), summary, lines.join("\n"))
        }
        StreamEvent::Result {
            conversation_id,
            quality,
            awaiting_approval,
            ..
        } => {
            let mut out = format!("{} {}", "✓ Generated".green().bold(), conversation_id.cyan());
            if let Some(report) = quality {
                out.push_str(&format!("\n{}", quality_line(report)));
            }
            if *awaiting_approval {
                out.push_str(&format!(
                    "\n{}",
                    format!(
                        "Awaiting approval: rerun with --conversation {} --approve or --reject",
                        conversation_id
                    )
                    .yellow()
                ));
            }
            out
        }
        StreamEvent::Error {
            kind,
            message,
            errors,
        } => {
            let mut out = format!("{} {} {}", "✗".red().bold(), format!("[{}]", kind).red(), message);
            for issue in errors {
                out.push_str(&format!("\n  - {}", issue));
            }
            out
        }
    }
}

fn color_diff_line(line: &str) -> String {
    if line.starts_with("+ ") {
        line.green().to_string()
    } else if line.starts_with("- ") {
        line.red().to_string()
    } else {
        line.dimmed().to_string()
    }
}

fn quality_line(report: &QualityReport) -> String {
    let verdict = if report.passed {
        "passed".green()
    } else {
        "below threshold".yellow()
    };
    format!(
        "Quality {}/100 ({}): completeness {}, structure {}, standards {}, best practices {}",
        report.total,
        verdict,
        report.completeness,
        report.structure,
        report.standards,
        report.best_practices
    )
}

fn status_label(status: ConversationStatus) -> ColoredString {
    match status {
        ConversationStatus::Active => "active".green(),
        ConversationStatus::Paused => "paused".yellow(),
        ConversationStatus::Completed => "completed".blue(),
        ConversationStatus::Error => "error".red(),
    }
}

pub fn conversation_table(conversations: &[ConversationMetadata]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        "ID",
        "Mode",
        "Status",
        "Description",
        "Messages",
        "Quality",
        "Updated",
    ]);

    for conversation in conversations {
        table.add_row(vec![
            conversation.id.clone(),
            conversation.mode.as_str().to_string(),
            conversation.status.as_str().to_string(),
            truncate(&conversation.description, 40),
            conversation.message_count.to_string(),
            conversation
                .latest_quality_score
                .map(|score| score.to_string())
                .unwrap_or_else(|| "—".to_string()),
            conversation.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    table
}
