//! Turn dispatcher: runs one chat turn under the process-wide dispatch
//! permit and appends the result to the transcript.
//!
//! With `max_concurrent_turns = 1` every turn in the process, across all
//! sessions, is serialized behind a single lock, including the downstream
//! network calls. Larger values turn the lock into a bounded pool.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::chain::ChainHandle;
use crate::models::{Credential, Transcript, Turn};

/// Reply appended when a session has no chain yet.
pub const UNCONFIGURED_MESSAGE: &str = "Please paste your OpenAI key to use";

#[derive(Clone)]
pub struct TurnDispatcher {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl TurnDispatcher {
    /// # Panics
    ///
    /// Panics if `max_concurrent` is zero; `load_config` rejects that value.
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be >= 1");
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// A dispatcher that allows exactly one turn in flight.
    pub fn serialized() -> Self {
        Self::new(1)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run one chat turn.
    ///
    /// Returns the updated transcript twice: once for display and once for
    /// session state. A missing `chain` is not an error: the turn is
    /// answered with [`UNCONFIGURED_MESSAGE`]. Chain failures are returned
    /// unchanged and leave the caller's transcript untouched; the permit is
    /// released before the error reaches the caller.
    pub async fn handle_turn(
        &self,
        credential: &Credential,
        utterance: &str,
        transcript: Option<Transcript>,
        chain: Option<&ChainHandle>,
    ) -> Result<(Transcript, Transcript)> {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| anyhow::anyhow!("dispatch semaphore closed: {}", e))?;

        let mut transcript = transcript.unwrap_or_default();

        let chain = match chain {
            Some(chain) => chain,
            None => {
                tracing::debug!("no chain configured for session");
                transcript.push(Turn::new(utterance, UNCONFIGURED_MESSAGE));
                return Ok((transcript.clone(), transcript));
            }
        };

        let started = Instant::now();
        let output = chain
            .call(credential, utterance, transcript.turns())
            .await?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            sources = output.sources.len(),
            "chat turn answered"
        );

        transcript.push(Turn::new(utterance, output.answer));
        Ok((transcript.clone(), transcript))
    }
}

impl Default for TurnDispatcher {
    fn default() -> Self {
        Self::serialized()
    }
}
