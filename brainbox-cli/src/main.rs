//! BrainBox CLI: terminal client for the BrainBox DSA tutor.
//!
//! Streams tutor answers with typewriter pacing and exposes problem data,
//! history, and conversations from the backend.

mod commands;
mod repl;
mod terminal;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// BrainBox: a patient DSA tutor in your terminal
#[derive(Parser, Debug)]
#[command(name = "brainbox", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (for `.brainbox/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces user and workspace config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Ask the tutor one question and stream the answer
    Ask {
        /// The question to ask
        question: String,
        /// Problem slug or URL (e.g. two-sum)
        #[arg(short, long)]
        problem: String,
        /// Conversation to continue (a new one is started if omitted)
        #[arg(long)]
        conversation: Option<String>,
        /// Delay between characters in milliseconds (0 disables pacing)
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Interactive tutoring session on one problem
    Chat {
        /// Problem slug or URL (e.g. two-sum)
        #[arg(short, long)]
        problem: String,
        /// Conversation to continue (a new one is started if omitted)
        #[arg(long)]
        conversation: Option<String>,
        /// Delay between characters in milliseconds (0 disables pacing)
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show a problem's details
    Problem {
        /// Problem slug or URL
        problem: String,
        /// Show the short summary with examples instead
        #[arg(long)]
        summary: bool,
    },
    /// Show the stored questions and answers of a conversation
    History {
        /// Conversation ID
        conversation: String,
    },
    /// Log in and save the access token to the user config
    Login {
        /// Account name
        username: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Print the token instead of saving it
        #[arg(long)]
        print: bool,
    },
    /// Create an account
    Signup {
        /// Account name
        username: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// List, rename, or delete your conversations
    Conversations {
        #[command(subcommand)]
        action: Option<ConversationAction>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConversationAction {
    /// List conversations, newest first (the default)
    List,
    /// Give a conversation a new title
    Rename {
        /// Conversation ID
        conversation: String,
        /// New title
        title: String,
    },
    /// Delete a conversation and its messages
    Delete {
        /// Conversation ID
        conversation: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "brainbox", "brainbox")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "brainbox.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = match &cli.config {
        Some(path) => brainbox_core::config::load_config_file(path, None),
        None => brainbox_core::config::load_config(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(base_url) = cli.base_url {
        config.backend.base_url = base_url;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    }

    match commands::handle_command(cli.command, config, cli.config).await {
        // Already shown to the user; only the exit status is left to set.
        Err(err) if err.is::<terminal::Reported>() => Ok(ExitCode::FAILURE),
        other => other.map(|()| ExitCode::SUCCESS),
    }
}
