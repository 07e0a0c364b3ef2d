//! # Chat-Your-Data CLI (`cyd`)
//!
//! ## Usage
//!
//! ```bash
//! cyd --config ./config/cyd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cyd serve` | Start the web chat server |
//! | `cyd ask "<question>"` | Answer one question in the terminal |
//! | `cyd chat` | Interactive chat on stdin |
//! | `cyd index` | Summarize the document index |
//!
//! ## Examples
//!
//! ```bash
//! # Serve the chat UI on the configured address
//! cyd serve --config ./config/cyd.toml
//!
//! # One-shot question
//! cyd ask "Where are the frontlines?" --api-key sk-...
//! ```

use chat_your_data::{ask, config, logging, server, stats};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chat-Your-Data: conversational question answering over a precomputed
/// document index.
#[derive(Parser)]
#[command(
    name = "cyd",
    about = "Chat-Your-Data: conversational question answering over a document index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cyd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web chat server.
    ///
    /// Loads the document index once, then serves the chat page and JSON
    /// API on `[server].bind` until terminated.
    Serve,

    /// Answer a single question.
    ///
    /// Without `--api-key` the reply is the "paste your key" message.
    Ask {
        /// The question to ask.
        question: String,

        /// OpenAI API key used for this question only.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Chat interactively, reading questions from stdin.
    Chat {
        /// OpenAI API key used for this session only.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Show document index statistics (chunks, sources, fingerprint).
    Index,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { question, api_key } => {
            ask::run_ask(&cfg, &question, api_key).await?;
        }
        Commands::Chat { api_key } => {
            ask::run_chat(&cfg, api_key).await?;
        }
        Commands::Index => {
            stats::run_index_stats(&cfg)?;
        }
    }

    Ok(())
}
