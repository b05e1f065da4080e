//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for search and chat, plus a server-sent events
//! stream for incremental answers.

use crate::app::App;
use crate::catalog::{Item, ItemId, Section};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::intent::QueryIntent;
use crate::rag::{validate, ChatRequest, ResponseOrchestrator, ResponseOutcome, RetrievalRequest};
use crate::ranking::RankedSection;
use crate::vector_store::SearchFilter;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Shared application state.
struct AppState {
    app: App,
    orchestrator: ResponseOrchestrator,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Answer, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let app = App::new(settings)?;
    let orchestrator = app.orchestrator(None)?;
    let router = router(Arc::new(AppState { app, orchestrator }));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Marquee API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Search", "POST /search");
    Output::kv("Chat", "POST /chat");
    Output::kv("Chat (SSE)", "POST /chat/stream");
    Output::kv("Get Item", "GET  /items/:item_id");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/items/{item_id}", get(get_item))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    item_id: Option<ItemId>,
}

#[derive(Serialize)]
struct SearchResponse {
    intent: QueryIntent,
    results: Vec<RankedSection>,
}

#[derive(Serialize)]
struct ItemResponse {
    #[serde(flatten)]
    item: Item,
    sections: Vec<Section>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Response {
    let query = match validate::prepare_message(&req.query) {
        Ok(query) => query,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let retrieval = &state.app.settings().retrieval;
    let mode = match req.item_id {
        Some(_) => &retrieval.item,
        None => &retrieval.global,
    };
    let intent = state.app.classifier().classify(&query, false);

    let results = state
        .orchestrator
        .pipeline()
        .retrieve(&RetrievalRequest {
            query: &query,
            digest: None,
            intent,
            filter: req.item_id.map(SearchFilter::item),
            k: req.limit.unwrap_or(mode.k),
        })
        .await;

    match results {
        Ok(results) => Json(SearchResponse { intent, results }).into_response(),
        Err(e) => {
            error!("Search failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                state.orchestrator.error_message(),
            )
        }
    }
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let response = state.orchestrator.respond(req).await;
    let status = match response.metadata.outcome {
        ResponseOutcome::Rejected => StatusCode::BAD_REQUEST,
        ResponseOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(response)).into_response()
}

async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.orchestrator.respond_stream(req).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
        });
        Ok(Event::default().event(event.name()).data(data))
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn get_item(State(state): State<Arc<AppState>>, Path(item_id): Path<ItemId>) -> Response {
    let store = state.app.content_store();
    match store.get_item(item_id).await {
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Item not found: {}", item_id),
        ),
        Ok(Some(item)) => match store.sections_for_item(item_id).await {
            Ok(sections) => Json(ItemResponse { item, sections }).into_response(),
            Err(e) => item_failed(&state, item_id, e),
        },
        Err(e) => item_failed(&state, item_id, e),
    }
}

fn item_failed(state: &AppState, item_id: ItemId, e: impl std::fmt::Display) -> Response {
    error!("Loading item {} failed: {}", item_id, e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        state.orchestrator.error_message(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{parse_catalog, SectionKind};
    use crate::content_store::MemoryContentStore;
    use crate::error::{MarqueeError, Result};
    use crate::vector_store::{VectorMatch, VectorStore};
    use crate::llm::{ChatMessage, GenerationOptions, LanguageModel, TokenStream};
    use async_trait::async_trait;

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, _messages: &[ChatMessage], _options: &GenerationOptions) -> Result<String> {
            Ok("Heat is about obsession.".to_string())
        }

        async fn complete_stream(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<TokenStream> {
            Ok(futures::stream::iter(vec![Ok("Heat is ".to_string()), Ok("about obsession.".to_string())]).boxed())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    /// A vector store whose backend is down.
    struct UnreachableStore;

    #[async_trait]
    impl VectorStore for UnreachableStore {
        async fn upsert(&self, _: ItemId, _: SectionKind, _: &[f32]) -> Result<()> {
            Err(MarqueeError::Io(std::io::Error::other("connection refused")))
        }

        async fn search(&self, _: &[f32], _: usize, _: Option<&SearchFilter>) -> Result<Vec<VectorMatch>> {
            Err(MarqueeError::Io(std::io::Error::other(
                "connection refused by 10.0.0.7:6333",
            )))
        }

        async fn delete_by_item(&self, _: ItemId) -> Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        settings.embedding.dimensions = 128;
        settings.vector_store.provider = "memory".to_string();
        settings.content_store.provider = "memory".to_string();
        settings
    }

    async fn test_state() -> Arc<AppState> {
        let settings = test_settings();

        let app = App::new(settings).unwrap();
        let entries = parse_catalog(
            r#"[{"id": 2, "title": "Heat", "year": 1995, "sections": {
                "themes": "Obsession and professionalism on both sides of the law."
            }}]"#,
        )
        .unwrap();
        app.index_catalog(&entries, |_| {}).await.unwrap();

        let orchestrator = app.orchestrator_with(Arc::new(EchoModel));
        Arc::new(AppState { app, orchestrator })
    }

    #[tokio::test]
    async fn test_get_item() {
        let state = test_state().await;

        let response = get_item(State(state.clone()), Path(2)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_item(State(state), Path(99)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let state = test_state().await;
        let response = search(
            State(state),
            Json(SearchRequest {
                query: "   ".to_string(),
                limit: None,
                item_id: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_ok() {
        let state = test_state().await;
        let response = search(
            State(state),
            Json(SearchRequest {
                query: "Obsession and professionalism on both sides of the law.".to_string(),
                limit: Some(3),
                item_id: Some(2),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_search_failure_hides_internal_error() {
        let app = App::with_stores(
            test_settings(),
            Arc::new(UnreachableStore),
            Arc::new(MemoryContentStore::new()),
        )
        .unwrap();
        let orchestrator = app.orchestrator_with(Arc::new(EchoModel));
        let state = Arc::new(AppState { app, orchestrator });

        let response = search(
            State(state),
            Json(SearchRequest {
                query: "Obsession and professionalism".to_string(),
                limit: None,
                item_id: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Sorry, I encountered an error. Please try again.");
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_chat_status_codes() {
        let state = test_state().await;

        let response = chat(State(state.clone()), Json(ChatRequest::new(""))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = chat(
            State(state),
            Json(ChatRequest::new("What are the themes of Heat?")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_builds() {
        let _router = router(test_state().await);
    }
}
