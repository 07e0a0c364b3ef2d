//! Conversational retrieval chain.
//!
//! A [`Chain`] answers a question given the prior turns of a conversation.
//! The concrete [`ConversationalRetrievalChain`] works in three steps:
//!
//! ```text
//! question + history ──▶ condense ──▶ standalone question
//!                                          │ embed
//!                                          ▼
//!                     DocumentIndex::similarity_search (top_k)
//!                                          │
//!                                          ▼
//!                         QA prompt ──▶ chat model ──▶ answer
//! ```
//!
//! The condense step is skipped when there is no history. The credential
//! is passed into every call; the chain never stores it.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::index::DocumentIndex;
use crate::llm::ChatModel;
use crate::models::{Credential, RetrievedChunk, Turn};

/// Shared, type-erased chain held in session state.
pub type ChainHandle = Arc<dyn Chain>;

/// Result of a single chain invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutput {
    pub answer: String,
    /// The question actually used for retrieval.
    pub standalone_question: String,
    pub sources: Vec<RetrievedChunk>,
}

#[async_trait]
pub trait Chain: Send + Sync {
    async fn call(
        &self,
        credential: &Credential,
        question: &str,
        chat_history: &[Turn],
    ) -> Result<ChainOutput>;
}

pub struct ConversationalRetrievalChain {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    top_k: usize,
    topic: String,
}

impl ConversationalRetrievalChain {
    pub fn new(
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        top_k: usize,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            top_k,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Chain for ConversationalRetrievalChain {
    async fn call(
        &self,
        credential: &Credential,
        question: &str,
        chat_history: &[Turn],
    ) -> Result<ChainOutput> {
        let standalone_question = if chat_history.is_empty() {
            question.to_string()
        } else {
            let prompt = condense_question_prompt(chat_history, question);
            self.llm.complete(credential, &prompt).await?.trim().to_string()
        };
        tracing::debug!(%standalone_question, "condensed question");

        let query_vec = self
            .embedder
            .embed_query(credential, &standalone_question)
            .await?;
        let sources = self.index.similarity_search(&query_vec, self.top_k)?;

        let prompt = qa_prompt(&self.topic, &standalone_question, &sources);
        let answer = self.llm.complete(credential, &prompt).await?.trim().to_string();

        Ok(ChainOutput {
            answer,
            standalone_question,
            sources,
        })
    }
}

/// Render prior turns as alternating `Human:` / `Assistant:` lines.
pub fn format_chat_history(chat_history: &[Turn]) -> String {
    chat_history
        .iter()
        .map(|t| format!("\nHuman: {}\nAssistant: {}", t.question, t.answer))
        .collect()
}

pub fn condense_question_prompt(chat_history: &[Turn], question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question.\n\
         \n\
         Chat History:\n\
         {}\n\
         Follow Up Input: {}\n\
         Standalone question:",
        format_chat_history(chat_history),
        question
    )
}

pub fn qa_prompt(topic: &str, question: &str, sources: &[RetrievedChunk]) -> String {
    let context = sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an AI assistant for answering questions about {topic}. \
         You are given the following extracted parts of a long document and a question. \
         Provide a conversational answer. \
         If you don't know the answer, just say \"Hmm, I'm not sure.\" Don't try to make up an answer. \
         If the question is not about {topic}, politely inform them that you are tuned to only answer questions about {topic}.\n\
         Question: {question}\n\
         =========\n\
         {context}\n\
         =========\n\
         Answer in Markdown:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexedChunk;
    use std::sync::Mutex;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed_query(&self, _credential: &Credential, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    /// Records every prompt and replies from a script.
    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _credential: &Credential, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    fn test_index() -> Arc<DocumentIndex> {
        let chunks = vec![
            IndexedChunk {
                id: "front#0".into(),
                source: "front.html".into(),
                title: None,
                text: "The frontline runs along the Dnipro.".into(),
                embedding: vec![1.0, 0.0],
            },
            IndexedChunk {
                id: "power#0".into(),
                source: "power.html".into(),
                title: None,
                text: "Consolidation of power in occupied areas.".into(),
                embedding: vec![0.0, 1.0],
            },
        ];
        Arc::new(DocumentIndex::from_chunks(chunks, None, String::new()).unwrap())
    }

    #[tokio::test]
    async fn test_no_history_skips_condense() {
        let model = Arc::new(ScriptedModel::new(&["  Along the Dnipro.  "]));
        let chain = ConversationalRetrievalChain::new(
            test_index(),
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            model.clone(),
            1,
            "the war",
        );

        let out = chain
            .call(&Credential::new("sk"), "Where are the frontlines?", &[])
            .await
            .unwrap();

        assert_eq!(out.answer, "Along the Dnipro.");
        assert_eq!(out.standalone_question, "Where are the frontlines?");
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].id, "front#0");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("The frontline runs along the Dnipro."));
        assert!(!prompts[0].contains("Consolidation"));
    }

    #[tokio::test]
    async fn test_history_triggers_condense() {
        let model = Arc::new(ScriptedModel::new(&[
            "How is power being consolidated?",
            "Through appointments.",
        ]));
        let chain = ConversationalRetrievalChain::new(
            test_index(),
            Arc::new(FixedEmbedder(vec![0.0, 1.0])),
            model.clone(),
            2,
            "the war",
        );

        let history = vec![Turn::new("Where are the frontlines?", "Along the Dnipro.")];
        let out = chain
            .call(&Credential::new("sk"), "And power?", &history)
            .await
            .unwrap();

        assert_eq!(out.standalone_question, "How is power being consolidated?");
        assert_eq!(out.answer, "Through appointments.");
        assert_eq!(out.sources[0].id, "power#0");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Human: Where are the frontlines?\nAssistant: Along the Dnipro."));
        assert!(prompts[0].ends_with("Follow Up Input: And power?\nStandalone question:"));
        assert!(prompts[1].contains("Question: How is power being consolidated?"));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let chain = ConversationalRetrievalChain::new(
            test_index(),
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Arc::new(ScriptedModel::new(&[])),
            1,
            "the war",
        );
        let err = chain
            .call(&Credential::new("sk"), "q", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
    }

    #[test]
    fn test_qa_prompt_layout() {
        let sources = vec![RetrievedChunk {
            id: "x".into(),
            source: "x.html".into(),
            title: None,
            text: "CONTEXT".into(),
            score: 1.0,
        }];
        let prompt = qa_prompt("the union address", "Q?", &sources);
        assert!(prompt.starts_with("You are an AI assistant for answering questions about the union address."));
        assert!(prompt.contains("Hmm, I'm not sure."));
        assert!(prompt.contains("Question: Q?\n=========\nCONTEXT\n=========\nAnswer in Markdown:"));
    }
}
