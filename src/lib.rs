//! Marquee - Conversational Q&A over a movie catalog
//!
//! A retrieval-and-ranking pipeline that answers questions about movies from
//! long-form text sections (plot structure, themes, characters, reception and
//! more) stored per title.
//!
//! # Overview
//!
//! Marquee allows you to:
//! - Index a catalog export: one embedding per section, stored alongside its text
//! - Classify a question's intent and weight section kinds accordingly
//! - Retrieve, rerank and diversify sections across the whole catalog or one title
//! - Answer with a language model, synchronously or as a stream of events
//! - Keep multi-turn conversations, scoping follow-ups to titles already discussed
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Settings and prompt templates
//! - `catalog` - Items, sections and section kinds
//! - `content_store` - Section text and item metadata
//! - `embedding` - Embedding generation and caching
//! - `vector_store` - Vector storage and filtered candidate search
//! - `intent` - Query intent classification
//! - `ranking` - Relevance weighting, reranking and diversity selection
//! - `memory` - Conversation state
//! - `llm` - Language model access and answer post-processing
//! - `rag` - Retrieval pipeline and answer orchestration
//! - `app` - Wiring from settings to a working pipeline
//!
//! # Example
//!
//! ```rust,no_run
//! use marquee::app::App;
//! use marquee::config::Settings;
//! use marquee::rag::ChatRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let app = App::new(settings)?;
//!     let orchestrator = app.orchestrator(None)?;
//!
//!     let response = orchestrator
//!         .respond(ChatRequest::new("What are the main themes of Heat?"))
//!         .await;
//!     println!("{}", response.message);
//!
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod content_store;
pub mod embedding;
pub mod error;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod openai;
pub mod rag;
pub mod ranking;
pub mod vector_store;

pub use error::{MarqueeError, Result};
