use clap::{Parser, Subcommand};
use colored::*;
use specforge_cli::{init_tracing, App};
use specforge_core::Config;
use std::process;

mod cli;

use cli::conversations::{handle_conversations_command, run_cleanup, ConversationsCommands};
use cli::generate::{handle_generate_command, GenerateArgs};

#[derive(Parser)]
#[command(name = "specforge")]
#[command(about = "specforge - conversational OpenAPI specification generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or modify an OpenAPI specification, streaming progress events
    Generate(GenerateArgs),
    /// Inspect and manage stored conversations
    #[command(subcommand)]
    Conversations(ConversationsCommands),
    /// Remove expired conversations now
    Cleanup,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::from_env()?;
    let app = App::from_config(config).await?;

    let result = match cli.command {
        Commands::Generate(args) => {
            app.start_cleanup().await;
            handle_generate_command(&app, args).await
        }
        Commands::Conversations(command) => {
            handle_conversations_command(&app, command).await.map(|_| 0)
        }
        Commands::Cleanup => run_cleanup(&app).await.map(|_| 0),
    };

    app.shutdown().await;
    result
}
