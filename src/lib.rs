//! # Chat-Your-Data
//!
//! Conversational question answering over a fixed document collection.
//!
//! A precomputed vector index is loaded once at startup. Each chat session
//! supplies an OpenAI API key, which builds a conversational retrieval
//! chain for that session; every chat turn then runs through a single
//! process-wide dispatcher that appends to the session's transcript.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  key   ┌────────────┐        ┌───────────────┐
//! │  Browser /   │───────▶│  session   │───────▶│ Conversational│
//! │  CLI session │        │ initialize │ chain  │ RetrievalChain│
//! └──────┬───────┘        └────────────┘        └──────┬────────┘
//!        │ message                                     │ embed + search
//!        ▼                                             ▼
//! ┌──────────────┐  permit  ┌──────────┐        ┌───────────────┐
//! │TurnDispatcher│─────────▶│  chain   │───────▶│ DocumentIndex │
//! └──────────────┘          │  .call() │        │  (read-only)  │
//!                           └──────────┘        └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Credential, turn and transcript types |
//! | [`index`] | Document index loading and similarity search |
//! | [`embedding`] | Query embedding and cosine similarity |
//! | [`llm`] | Chat-completion model |
//! | [`chain`] | Conversational retrieval chain |
//! | [`session`] | Session initializer |
//! | [`dispatch`] | Turn dispatcher |
//! | [`server`] | Web chat server |

pub mod ask;
pub mod chain;
pub mod config;
pub mod dispatch;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod openai;
pub mod server;
pub mod session;
pub mod stats;
