use anyhow::bail;
use clap::Subcommand;
use colored::*;
use specforge_cli::output::conversation_table;
use specforge_cli::App;
use specforge_core::ConversationState;

#[derive(Subcommand)]
pub enum ConversationsCommands {
    /// List stored conversations
    List,
    /// Show conversation details
    Show {
        /// Conversation ID to show
        id: String,
        /// Print the full conversation state as JSON
        #[arg(long)]
        json: bool,
        /// Print only the current specification
        #[arg(long, conflicts_with = "json")]
        spec: bool,
    },
    /// Delete a conversation
    Delete {
        /// Conversation ID to delete
        id: String,
    },
}

pub async fn handle_conversations_command(
    app: &App,
    command: ConversationsCommands,
) -> anyhow::Result<()> {
    match command {
        ConversationsCommands::List => list_conversations(app).await,
        ConversationsCommands::Show { id, json, spec } => show_conversation(app, &id, json, spec).await,
        ConversationsCommands::Delete { id } => delete_conversation(app, &id).await,
    }
}

async fn list_conversations(app: &App) -> anyhow::Result<()> {
    let conversations = app.manager().list().await?;

    if conversations.is_empty() {
        println!("{}", "No conversations found".yellow());
        println!("{}", "Use 'specforge generate \"<description>\"' to start one".dimmed());
        return Ok(());
    }

    println!("{}", conversation_table(&conversations));
    println!("Total: {} conversations", conversations.len().to_string().cyan());
    Ok(())
}

async fn show_conversation(app: &App, id: &str, json: bool, spec_only: bool) -> anyhow::Result<()> {
    let Some(state) = app.manager().get(id).await? else {
        bail!("Conversation '{}' not found or expired", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    if spec_only {
        match &state.current_spec {
            Some(spec) => print!("{}", spec),
            None => bail!("Conversation '{}' has no specification yet", id),
        }
        return Ok(());
    }

    print_details(&state);
    Ok(())
}

fn print_details(state: &ConversationState) {
    println!("{}", format!("Conversation {}", state.id).blue().bold());
    println!();
    println!("{:<14} {}", "Mode:".bold(), state.mode.as_str());
    println!("{:<14} {}", "Status:".bold(), state.status);
    if let Some(waiting_for) = state.waiting_for {
        println!("{:<14} {}", "Waiting for:".bold(), waiting_for);
    }
    println!("{:<14} {}", "Description:".bold(), state.description);
    if let Some(template) = &state.context.template_used {
        println!("{:<14} {}", "Template:".bold(), template);
    }
    if !state.context.patterns_applied.is_empty() {
        let patterns: Vec<&str> = state.context.patterns_applied.iter().map(String::as_str).collect();
        println!("{:<14} {}", "Patterns:".bold(), patterns.join(", "));
    }
    if let Some(score) = state.context.quality_scores.last() {
        println!("{:<14} {}/100", "Quality:".bold(), score);
    }
    println!(
        "{:<14} {}",
        "Updated:".bold(),
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(question) = &state.pending_question {
        println!();
        println!("{} {} ({})", "Pending question:".yellow().bold(), question.question, question.id);
    }
    if let Some(diff) = &state.pending_diff {
        println!();
        println!("{} {}", "Pending change:".yellow().bold(), diff.summary);
    }

    if !state.context.applied_changes.is_empty() {
        println!();
        println!("{}", "Applied changes:".bold());
        for change in &state.context.applied_changes {
            println!("  - {}", change);
        }
    }

    println!();
    println!("{}", "Messages:".bold());
    for message in &state.messages {
        println!(
            "  {} {}",
            format!("[{}]", message.role.as_str()).dimmed(),
            specforge_core::truncate(&message.content, 100)
        );
    }
}

async fn delete_conversation(app: &App, id: &str) -> anyhow::Result<()> {
    if app.manager().delete(id).await? {
        println!("{} Deleted conversation {}", "✓".green(), id.cyan());
        Ok(())
    } else {
        bail!("Conversation '{}' not found", id)
    }
}

pub async fn run_cleanup(app: &App) -> anyhow::Result<()> {
    let stats = app.manager().cleanup().await?;
    println!(
        "{} Removed {} expired conversations",
        "✓".green(),
        stats.expired_conversations.to_string().cyan()
    );
    Ok(())
}
