//! Session initializer: turns an API key into a chain handle.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::chain::{ChainHandle, ConversationalRetrievalChain};
use crate::config::Config;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::index::DocumentIndex;
use crate::llm::{ChatModel, OpenAIChatModel};
use crate::models::Credential;
use crate::openai::{bearer_header, OpenAIClient};

/// Build a chain for `credential`, bound to the shared `index`.
///
/// Returns `Ok(None)` for the empty credential without doing anything
/// else. A non-empty credential is validated but not kept:
/// every later chain call receives the credential explicitly.
///
/// Construction errors (e.g. a key that cannot form an `Authorization`
/// header) are returned to the caller.
pub fn initialize(
    credential: &Credential,
    index: &Arc<DocumentIndex>,
    config: &Config,
) -> Result<Option<ChainHandle>> {
    if credential.is_empty() {
        return Ok(None);
    }

    bearer_header(credential).context("Failed to construct chain")?;

    let client = OpenAIClient::new(&config.openai)?;
    let embedder = OpenAIEmbedder::new(client.clone(), &config.openai);
    let llm = OpenAIChatModel::new(client, &config.openai);

    tracing::debug!(
        chat_model = llm.model_name(),
        embedding_model = embedder.model_name(),
        "constructing conversational retrieval chain"
    );

    let chain = ConversationalRetrievalChain::new(
        Arc::clone(index),
        Arc::new(embedder),
        Arc::new(llm),
        config.retrieval.top_k,
        config.chain.topic.clone(),
    );

    Ok(Some(Arc::new(chain)))
}
