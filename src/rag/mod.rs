//! Retrieval-augmented answers about the catalog.
//!
//! [`RetrievalPipeline`] turns a question into ranked sections;
//! [`ResponseOrchestrator`] wraps it with classification, conversation
//! memory, prompting, generation and fallbacks.

mod fallback;
mod pipeline;
mod prompt;
mod response;
pub mod validate;

pub use fallback::top_titles;
pub use pipeline::{enhanced_query, RetrievalPipeline, RetrievalRequest};
pub use prompt::{build_messages, format_context_for_prompt, section_budget, PromptInput};
pub use response::{
    ChatEvent, ChatRequest, ChatResponse, PipelineState, ResponseMetadata, ResponseMetrics,
    ResponseOrchestrator, ResponseOutcome, SourceRef,
};
