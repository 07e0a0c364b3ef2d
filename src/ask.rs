//! Terminal front-ends: a one-shot question (`cyd ask`) and an
//! interactive session on stdin (`cyd chat`).
//!
//! Both drive the same session initializer and turn dispatcher as the HTTP
//! server, with a single local session.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::dispatch::TurnDispatcher;
use crate::index::DocumentIndex;
use crate::models::{Credential, Transcript};
use crate::session;

/// Answer a single question and print the reply.
pub async fn run_ask(config: &Config, question: &str, api_key: Option<String>) -> Result<()> {
    let index = Arc::new(DocumentIndex::load(&config.index.path)?);
    index.check_embedding_model(&config.openai.embedding_model);

    let credential = Credential::from(api_key.unwrap_or_default());
    let chain = session::initialize(&credential, &index, config)?;
    let dispatcher = TurnDispatcher::new(config.dispatch.max_concurrent_turns);

    let (transcript, _) = dispatcher
        .handle_turn(&credential, question, None, chain.as_ref())
        .await?;

    if let Some(turn) = transcript.last() {
        println!("{}", turn.answer);
    }

    Ok(())
}

/// Read questions from stdin until EOF, keeping one transcript.
///
/// A failed turn is reported and leaves the transcript unchanged.
pub async fn run_chat(config: &Config, api_key: Option<String>) -> Result<()> {
    let index = Arc::new(DocumentIndex::load(&config.index.path)?);
    index.check_embedding_model(&config.openai.embedding_model);

    let credential = Credential::from(api_key.unwrap_or_default());
    let chain = session::initialize(&credential, &index, config)?;
    let dispatcher = TurnDispatcher::new(config.dispatch.max_concurrent_turns);

    println!("{}", config.server.title);
    println!("Type a question and press Enter. Ctrl-D to quit.");
    if !config.server.examples.is_empty() {
        println!("Examples:");
        for example in &config.server.examples {
            println!("  - {}", example);
        }
    }

    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        match dispatcher
            .handle_turn(&credential, question, Some(transcript.clone()), chain.as_ref())
            .await
        {
            Ok((updated, _)) => {
                transcript = updated;
                if let Some(turn) = transcript.last() {
                    println!("{}\n", turn.answer);
                }
            }
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    println!();
    Ok(())
}
