//! Answer orchestration: one user message in, one answer (or event stream)
//! out.

use super::pipeline::{RetrievalPipeline, RetrievalRequest};
use super::{fallback, prompt, validate};
use crate::catalog::{Item, ItemId, SectionKind};
use crate::config::{ModeSettings, Prompts};
use crate::error::{MarqueeError, Result};
use crate::intent::{QueryClassifier, QueryIntent};
use crate::llm::postprocess::{finalize, ControlTokenFilter};
use crate::llm::{ChatMessage, GenerationOptions, LanguageModel};
use crate::memory::{ConversationMemory, ConversationState, ConversationStore, ConversationTurn, ConversationUpdate};
use crate::ranking::RankedSection;
use crate::vector_store::SearchFilter;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted for a new conversation; an id is minted and returned.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Scope the conversation to one item.
    #[serde(default)]
    pub item_id: Option<ItemId>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            item_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn about_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }
}

/// Stages a request passes through. Recorded in the response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Classifying,
    Retrieving,
    ContextBuilt,
    Generating,
    StreamingTokens,
    DoneSync,
    Done,
    Error,
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    /// The model answered from retrieved context.
    Answered,
    /// Nothing relevant was retrieved; the model was not called.
    NoResults,
    /// The model failed; the answer lists the best candidates instead.
    GenerationFallback,
    /// The request was refused (bad message, unknown item).
    Rejected,
    /// Embedding, retrieval or storage failed.
    Failed,
}

/// A source as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub item_id: ItemId,
    pub item_title: String,
    pub item_year: Option<i32>,
    pub section_kind: SectionKind,
    pub similarity: f32,
    pub weighted_score: f32,
}

impl From<&RankedSection> for SourceRef {
    fn from(section: &RankedSection) -> Self {
        Self {
            document_id: section.document_id.clone(),
            item_id: section.item_id,
            item_title: section.item_title.clone(),
            item_year: section.item_year,
            section_kind: section.section_kind,
            similarity: section.raw_similarity,
            weighted_score: section.weighted_score,
        }
    }
}

/// Timings and retrieval statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub avg_similarity: f32,
    pub num_sources: usize,
    pub num_items: usize,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub conversation_id: Option<String>,
    pub intent: Option<QueryIntent>,
    pub outcome: ResponseOutcome,
    pub path: Vec<PipelineState>,
    pub sources: Vec<SourceRef>,
    /// Referenced items after this exchange.
    pub referenced_items: Vec<String>,
    pub is_first_message: bool,
    pub opening_sent: bool,
    /// Whether the exchange was written to the conversation store.
    pub persisted: bool,
    pub model: Option<String>,
    pub metrics: ResponseMetrics,
}

/// The answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub metadata: ResponseMetadata,
}

/// Streaming events, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    RetrievalStarted,
    Sources { sources: Vec<SourceRef> },
    GenerationStarted,
    Token { content: String },
    /// Terminal. Sent only after the exchange has been persisted.
    Done { message: String, metadata: ResponseMetadata },
    /// Terminal.
    Error { message: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done { .. } | ChatEvent::Error { .. })
    }

    /// The `type` tag this event serializes with.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::RetrievalStarted => "retrieval_started",
            ChatEvent::Sources { .. } => "sources",
            ChatEvent::GenerationStarted => "generation_started",
            ChatEvent::Token { .. } => "token",
            ChatEvent::Done { .. } => "done",
            ChatEvent::Error { .. } => "error",
        }
    }
}

/// One request in flight.
struct Turn {
    conversation_id: String,
    message: String,
    state: ConversationState,
    item: Option<Item>,
    mode: ModeSettings,
    intent: QueryIntent,
    path: Vec<PipelineState>,
    sources: Vec<RankedSection>,
    started: Instant,
    retrieval_ms: u64,
    generation_ms: u64,
}

/// Drives classification, retrieval, prompting, generation and
/// persistence for chat requests.
#[derive(Clone)]
pub struct ResponseOrchestrator {
    pipeline: Arc<RetrievalPipeline>,
    conversations: Arc<dyn ConversationStore>,
    llm: Arc<dyn LanguageModel>,
    classifier: Arc<QueryClassifier>,
    memory: Arc<ConversationMemory>,
    prompts: Arc<Prompts>,
    options: GenerationOptions,
    global: ModeSettings,
    item: ModeSettings,
}

impl ResponseOrchestrator {
    pub fn new(
        pipeline: Arc<RetrievalPipeline>,
        conversations: Arc<dyn ConversationStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            pipeline,
            conversations,
            llm,
            classifier: Arc::new(QueryClassifier::default()),
            memory: Arc::new(ConversationMemory::default()),
            prompts: Arc::new(Prompts::default()),
            options: GenerationOptions::default(),
            global: ModeSettings::global(),
            item: ModeSettings::item(),
        }
    }

    pub fn with_classifier(mut self, classifier: QueryClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = Arc::new(memory);
        self
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_modes(mut self, global: ModeSettings, item: ModeSettings) -> Self {
        self.global = global;
        self.item = item;
        self
    }

    pub fn pipeline(&self) -> &Arc<RetrievalPipeline> {
        &self.pipeline
    }

    /// The message shown to users when a request fails internally.
    pub fn error_message(&self) -> String {
        fallback::error_message(&self.prompts)
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    /// Answer a request in one piece. Never fails: problems become a
    /// fallback answer with the matching outcome.
    #[instrument(skip(self, request), fields(conversation_id = ?request.conversation_id, item_id = ?request.item_id))]
    pub async fn respond(&self, request: ChatRequest) -> ChatResponse {
        let requested_id = request.conversation_id.clone();
        let mut turn = match self.begin(request).await {
            Ok(turn) => turn,
            Err(e) => return self.rejected(requested_id, e),
        };

        if let Err(e) = self.retrieve(&mut turn).await {
            return self.failed(turn, e);
        }

        if turn.sources.is_empty() {
            let message = fallback::no_results(&self.prompts);
            turn.path.push(PipelineState::DoneSync);
            return self.finish(turn, message, ResponseOutcome::NoResults).await;
        }

        let messages = self.build_messages(&mut turn);
        turn.path.push(PipelineState::Generating);

        let generation_start = Instant::now();
        let answer = match self.llm.complete(&messages, &self.options).await {
            Ok(raw) => Some(finalize(&raw, turn.mode.max_sentences)).filter(|a| !a.is_empty()),
            Err(e) => {
                warn!("Generation failed: {}", e);
                None
            }
        };
        turn.generation_ms = generation_start.elapsed().as_millis() as u64;
        turn.path.push(PipelineState::DoneSync);

        match answer {
            Some(answer) => self.finish(turn, answer, ResponseOutcome::Answered).await,
            None => {
                let message = fallback::suggestions(&self.prompts, &turn.sources);
                self.finish(turn, message, ResponseOutcome::GenerationFallback).await
            }
        }
    }

    /// Answer a request as a stream of events ending in exactly one
    /// [`ChatEvent::Done`] or [`ChatEvent::Error`].
    ///
    /// The exchange is persisted only when the stream reaches `Done`.
    /// Dropping the stream early cancels generation and persists nothing.
    pub fn respond_stream(&self, request: ChatRequest) -> impl Stream<Item = ChatEvent> + Send + 'static {
        let this = self.clone();

        stream! {
            let requested_id = request.conversation_id.clone();
            let mut turn = match this.begin(request).await {
                Ok(turn) => turn,
                Err(e) => {
                    let response = this.rejected(requested_id, e);
                    yield ChatEvent::Error { message: response.message };
                    return;
                }
            };

            yield ChatEvent::RetrievalStarted;
            if let Err(e) = this.retrieve(&mut turn).await {
                let response = this.failed(turn, e);
                yield ChatEvent::Error { message: response.message };
                return;
            }

            yield ChatEvent::Sources { sources: turn.sources.iter().map(SourceRef::from).collect() };

            if turn.sources.is_empty() {
                let message = fallback::no_results(&this.prompts);
                turn.path.push(PipelineState::Done);
                yield ChatEvent::Token { content: message.clone() };
                let response = this.finish(turn, message, ResponseOutcome::NoResults).await;
                yield ChatEvent::Done { message: response.message, metadata: response.metadata };
                return;
            }

            let messages = this.build_messages(&mut turn);
            turn.path.push(PipelineState::Generating);
            yield ChatEvent::GenerationStarted;

            let generation_start = Instant::now();
            let mut raw = String::new();
            let mut emitted = 0usize;
            let mut failure: Option<MarqueeError> = None;

            match this.llm.complete_stream(&messages, &this.options).await {
                Ok(mut tokens) => {
                    turn.path.push(PipelineState::StreamingTokens);
                    let mut filter = ControlTokenFilter::new();
                    while let Some(chunk) = tokens.next().await {
                        match chunk {
                            Ok(chunk) => {
                                raw.push_str(&chunk);
                                let content = filter.push(&chunk);
                                if !content.is_empty() {
                                    emitted += 1;
                                    yield ChatEvent::Token { content };
                                }
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    if failure.is_none() {
                        let content = filter.flush();
                        if !content.is_empty() {
                            yield ChatEvent::Token { content };
                        }
                    }
                }
                Err(e) => failure = Some(e),
            }
            turn.generation_ms = generation_start.elapsed().as_millis() as u64;

            if let Some(e) = failure {
                if emitted > 0 {
                    // Part of an answer is already out; a fallback would contradict it.
                    let response = this.failed(turn, e);
                    yield ChatEvent::Error { message: response.message };
                    return;
                }
                warn!("Generation failed before any token: {}", e);
            }

            let answer = finalize(&raw, turn.mode.max_sentences);
            turn.path.push(PipelineState::Done);

            let response = if answer.is_empty() {
                let message = fallback::suggestions(&this.prompts, &turn.sources);
                yield ChatEvent::Token { content: message.clone() };
                this.finish(turn, message, ResponseOutcome::GenerationFallback).await
            } else {
                this.finish(turn, answer, ResponseOutcome::Answered).await
            };

            yield ChatEvent::Done { message: response.message, metadata: response.metadata };
        }
    }

    /// Validate the message, load the conversation and the item, classify.
    async fn begin(&self, request: ChatRequest) -> Result<Turn> {
        let started = Instant::now();
        let mut path = vec![PipelineState::Init];

        let message = validate::prepare_message(&request.message)?;

        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = self.conversations.state(&conversation_id).await?;

        let item = match request.item_id {
            Some(item_id) => Some(
                self.pipeline
                    .content_store()
                    .get_item(item_id)
                    .await?
                    .ok_or_else(|| MarqueeError::NotFound(format!("Item {} not found", item_id)))?,
            ),
            None => None,
        };
        let mode = match item {
            Some(_) => self.item.clone(),
            None => self.global.clone(),
        };

        path.push(PipelineState::Classifying);
        let intent = self.classifier.classify(&message, state.has_history());
        info!(intent = %intent, history = state.history.len(), "Classified query");

        Ok(Turn {
            conversation_id,
            message,
            state,
            item,
            mode,
            intent,
            path,
            sources: Vec::new(),
            started,
            retrieval_ms: 0,
            generation_ms: 0,
        })
    }

    /// Retrieve and keep the sources that go into the prompt.
    async fn retrieve(&self, turn: &mut Turn) -> Result<()> {
        turn.path.push(PipelineState::Retrieving);
        let retrieval_start = Instant::now();

        let digest = turn
            .state
            .has_history()
            .then(|| self.memory.default_digest(&turn.state.history));

        let filter = match &turn.item {
            Some(item) => Some(SearchFilter::item(item.id)),
            None if turn.intent == QueryIntent::FollowUp => self.follow_up_filter(&turn.state).await?,
            None => None,
        };

        let mut ranked = self
            .pipeline
            .retrieve(&RetrievalRequest {
                query: &turn.message,
                digest: digest.as_deref(),
                intent: turn.intent,
                filter,
                k: turn.mode.k,
            })
            .await?;
        ranked.truncate(turn.mode.prompt_sources);

        turn.retrieval_ms = retrieval_start.elapsed().as_millis() as u64;
        turn.sources = ranked;
        debug!(sources = turn.sources.len(), ms = turn.retrieval_ms, "Retrieval finished");
        Ok(())
    }

    /// Restrict a follow-up to the items already discussed. Falls back to a
    /// catalog-wide search when none of them resolve.
    async fn follow_up_filter(&self, state: &ConversationState) -> Result<Option<SearchFilter>> {
        let titles = if state.referenced_items.is_empty() {
            self.memory.referenced_items(&state.history)
        } else {
            state.referenced_items.clone()
        };

        let ids = self.pipeline.resolve_titles(&titles).await?;
        if ids.is_empty() {
            debug!("No referenced items resolved, searching the whole catalog");
            return Ok(None);
        }
        debug!(items = ?ids, "Restricting follow-up to referenced items");
        Ok(Some(SearchFilter::items(ids)))
    }

    fn build_messages(&self, turn: &mut Turn) -> Vec<ChatMessage> {
        let messages = prompt::build_messages(
            &self.prompts,
            &prompt::PromptInput {
                question: &turn.message,
                intent: turn.intent,
                item: turn.item.as_ref(),
                sources: &turn.sources,
                mode: &turn.mode,
                opening_sent: turn.state.opening_sent,
            },
        );
        turn.path.push(PipelineState::ContextBuilt);
        messages
    }

    /// Persist a completed exchange and build the response.
    async fn finish(&self, turn: Turn, message: String, outcome: ResponseOutcome) -> ChatResponse {
        let mut mentioned: Vec<String> = Vec::new();
        for source in &turn.sources {
            if !mentioned.contains(&source.item_title) {
                mentioned.push(source.item_title.clone());
            }
        }
        mentioned.extend(
            self.memory
                .referenced_items(&[ConversationTurn::user(turn.message.clone())]),
        );
        let referenced_items = self
            .memory
            .merge_referenced(&turn.state.referenced_items, &mentioned);

        // Only a real model answer means the opening instructions were used.
        let opening_sent = turn.state.opening_sent || outcome == ResponseOutcome::Answered;

        let update = ConversationUpdate {
            user_turn: turn.message.clone(),
            assistant_turn: message.clone(),
            referenced_items: referenced_items.clone(),
            opening_sent,
        };
        let persisted = match self.conversations.apply(&turn.conversation_id, update).await {
            Ok(()) => true,
            Err(e) => {
                warn!(conversation_id = %turn.conversation_id, "Failed to persist exchange: {}", e);
                false
            }
        };

        info!(
            outcome = ?outcome,
            sources = turn.sources.len(),
            total_ms = turn.started.elapsed().as_millis() as u64,
            "Response complete"
        );

        ChatResponse {
            message,
            metadata: ResponseMetadata {
                conversation_id: Some(turn.conversation_id.clone()),
                intent: Some(turn.intent),
                outcome,
                sources: turn.sources.iter().map(SourceRef::from).collect(),
                referenced_items,
                is_first_message: !turn.state.has_history(),
                opening_sent,
                persisted,
                model: (outcome == ResponseOutcome::Answered).then(|| self.llm.model_name().to_string()),
                metrics: metrics(&turn),
                path: turn.path,
            },
        }
    }

    /// Response for a failure after the turn started. Nothing is persisted.
    fn failed(&self, mut turn: Turn, error: MarqueeError) -> ChatResponse {
        warn!(
            conversation_id = %turn.conversation_id,
            retrieval = error.is_retrieval(),
            "Request failed: {}",
            error
        );
        turn.path.push(PipelineState::Error);

        ChatResponse {
            message: fallback::error_message(&self.prompts),
            metadata: ResponseMetadata {
                conversation_id: Some(turn.conversation_id.clone()),
                intent: Some(turn.intent),
                outcome: ResponseOutcome::Failed,
                sources: Vec::new(),
                referenced_items: turn.state.referenced_items.clone(),
                is_first_message: !turn.state.has_history(),
                opening_sent: turn.state.opening_sent,
                persisted: false,
                model: None,
                metrics: metrics(&turn),
                path: turn.path,
            },
        }
    }

    /// Response for a request that never got going.
    fn rejected(&self, conversation_id: Option<String>, error: MarqueeError) -> ChatResponse {
        let (message, outcome) = match &error {
            MarqueeError::InvalidInput(msg) | MarqueeError::NotFound(msg) => {
                (msg.clone(), ResponseOutcome::Rejected)
            }
            _ => (fallback::error_message(&self.prompts), ResponseOutcome::Failed),
        };
        warn!("Request not processed: {}", error);

        ChatResponse {
            message,
            metadata: ResponseMetadata {
                conversation_id,
                intent: None,
                outcome,
                path: vec![PipelineState::Init, PipelineState::Error],
                sources: Vec::new(),
                referenced_items: Vec::new(),
                is_first_message: false,
                opening_sent: false,
                persisted: false,
                model: None,
                metrics: ResponseMetrics::default(),
            },
        }
    }
}

fn metrics(turn: &Turn) -> ResponseMetrics {
    let num_sources = turn.sources.len();
    let avg_similarity = if num_sources == 0 {
        0.0
    } else {
        turn.sources.iter().map(|s| s.raw_similarity).sum::<f32>() / num_sources as f32
    };
    let num_items = turn
        .sources
        .iter()
        .map(|s| s.item_id)
        .collect::<HashSet<_>>()
        .len();

    ResponseMetrics {
        avg_similarity,
        num_sources,
        num_items,
        retrieval_ms: turn.retrieval_ms,
        generation_ms: turn.generation_ms,
        total_ms: turn.started.elapsed().as_millis() as u64,
    }
}
