use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use colored::*;
use futures::StreamExt;
use specforge_cli::output::{render_event, OutputFormat};
use specforge_cli::{parse_key_value, App};
use specforge_core::GenerationMode;
use specforge_generator::{CallerReply, GenerationPreferences, GenerationRequest, Pattern, StreamEvent};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status after Ctrl-C, as shells report SIGINT
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Create,
    Modify,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// What to build, or the change to make in modify mode
    pub description: Option<String>,

    #[arg(long, value_enum, default_value = "create")]
    pub mode: ModeArg,

    /// Existing specification to modify
    #[arg(long, value_name = "PATH")]
    pub spec_file: Option<PathBuf>,

    /// Continue an existing conversation
    #[arg(short, long, value_name = "ID")]
    pub conversation: Option<String>,

    /// Domain template to follow (ecommerce, social, blog, booking, fintech)
    #[arg(long, value_name = "NAME")]
    pub template: Option<String>,

    /// Always apply a pattern (pagination, authentication, error-handling)
    #[arg(long, value_name = "PATTERN", value_parser = parse_pattern)]
    pub include: Vec<Pattern>,

    /// Never apply a pattern
    #[arg(long, value_name = "PATTERN", value_parser = parse_pattern)]
    pub exclude: Vec<Pattern>,

    /// Only apply patterns given with --include
    #[arg(long)]
    pub no_auto_detect: bool,

    /// Pause for approval before applying a modification
    #[arg(long)]
    pub require_approval: bool,

    /// Extra requirement passed to the model
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub note: Vec<(String, String)>,

    /// Apply the pending change of a paused conversation
    #[arg(long, conflicts_with_all = ["reject", "answer"])]
    pub approve: bool,

    /// Discard the pending change of a paused conversation
    #[arg(long, conflicts_with = "answer")]
    pub reject: bool,

    /// Answer the pending question of a paused conversation
    #[arg(long, value_name = "QUESTION_ID=ANSWER", value_parser = parse_key_value)]
    pub answer: Option<(String, String)>,

    #[arg(long, value_enum, default_value = "ndjson")]
    pub format: OutputFormat,

    /// Write the resulting specification to a file
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

fn parse_pattern(input: &str) -> Result<Pattern, String> {
    Pattern::ALL
        .iter()
        .copied()
        .find(|pattern| pattern.as_str() == input)
        .ok_or_else(|| {
            let names: Vec<&str> = Pattern::ALL.iter().map(Pattern::as_str).collect();
            format!("unknown pattern '{}', expected one of: {}", input, names.join(", "))
        })
}

impl GenerateArgs {
    fn reply(&self) -> Option<CallerReply> {
        if self.approve {
            Some(CallerReply::ApproveDiff)
        } else if self.reject {
            Some(CallerReply::RejectDiff)
        } else {
            self.answer
                .as_ref()
                .map(|(question_id, answer)| CallerReply::Answer {
                    question_id: question_id.clone(),
                    answer: answer.clone(),
                })
        }
    }

    fn preferences(&self) -> GenerationPreferences {
        GenerationPreferences {
            auto_detect_patterns: !self.no_auto_detect,
            include_patterns: self.include.iter().copied().collect(),
            exclude_patterns: self.exclude.iter().copied().collect(),
            require_diff_approval: self.require_approval,
            notes: self.note.iter().cloned().collect(),
        }
    }

    async fn into_request(self) -> anyhow::Result<(GenerationRequest, OutputFormat, Option<PathBuf>)> {
        let description = self.description.clone().unwrap_or_default();

        let current_spec = match &self.spec_file {
            Some(path) => Some(
                tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            ),
            None => None,
        };

        if self.conversation.is_none() {
            if description.trim().is_empty() {
                bail!("A description is required when starting a new conversation");
            }
            if self.mode == ModeArg::Modify && current_spec.is_none() {
                bail!("--mode modify needs --spec-file with the specification to change");
            }
        }

        let mut request = match (self.mode, current_spec) {
            (ModeArg::Modify, Some(spec)) => GenerationRequest::modify(description, spec),
            (ModeArg::Modify, None) => GenerationRequest {
                mode: GenerationMode::Modify,
                ..GenerationRequest::create(description)
            },
            (ModeArg::Create, spec) => GenerationRequest {
                current_spec: spec,
                ..GenerationRequest::create(description)
            },
        }
        .with_preferences(self.preferences());

        if let Some(id) = &self.conversation {
            request = request.continuing(id.clone());
        }
        if let Some(template) = &self.template {
            request = request.with_template_hint(template.clone());
        }
        if let Some(reply) = self.reply() {
            request = request.with_reply(reply);
        }

        Ok((request, self.format, self.output))
    }
}

/// Stream events to stdout; returns the process exit code
pub async fn handle_generate_command(app: &App, args: GenerateArgs) -> anyhow::Result<i32> {
    let (request, format, output) = args.into_request().await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling generation");
            interrupt.cancel();
        }
    });

    let mut events = app
        .orchestrator()
        .generate_with_cancellation(request, cancel);

    let mut final_spec = None;
    let mut exit_code = EXIT_INTERRUPTED;

    while let Some(event) = events.next().await {
        println!("{}", render_event(&event, format)?);

        match event {
            StreamEvent::Result { spec, .. } => {
                final_spec = Some(spec);
                exit_code = 0;
            }
            StreamEvent::Error { .. } => exit_code = 1,
            _ => {}
        }
    }

    if exit_code == EXIT_INTERRUPTED {
        eprintln!("{}", "Generation cancelled".yellow());
        return Ok(exit_code);
    }

    if let Some(spec) = final_spec {
        match &output {
            Some(path) => {
                tokio::fs::write(path, &spec)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Specification written to {}", path.display());
            }
            None if format == OutputFormat::Pretty => {
                println!();
                print!("{}", spec);
            }
            None => {}
        }
    }

    Ok(exit_code)
}
