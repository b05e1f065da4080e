//! Ask command implementation.

use crate::app::App;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::{ChatRequest, ResponseOutcome};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    item: Option<i64>,
    model: Option<String>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Answer, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let app = App::new(settings)?;
    let orchestrator = app.orchestrator(model.as_deref())?;

    let mut request = ChatRequest::new(question);
    request.item_id = item;

    let spinner = Output::spinner("Searching the catalog...");
    let response = orchestrator.respond(request).await;
    spinner.finish_and_clear();

    match response.metadata.outcome {
        ResponseOutcome::Rejected | ResponseOutcome::Failed => {
            Output::error(&response.message);
            return Err(anyhow::anyhow!("{}", response.message));
        }
        ResponseOutcome::NoResults => Output::warning(&response.message),
        ResponseOutcome::GenerationFallback => {
            Output::warning("The language model did not answer; showing suggestions instead.");
            println!("\n{}\n", response.message);
        }
        ResponseOutcome::Answered => println!("\n{}\n", response.message),
    }

    if !response.metadata.sources.is_empty() {
        Output::header("Sources");
        Output::sources(&response.metadata.sources);
    }

    let metrics = &response.metadata.metrics;
    Output::kv(
        "Timing",
        &format!(
            "retrieval {} ms, generation {} ms, total {} ms",
            metrics.retrieval_ms, metrics.generation_ms, metrics.total_ms
        ),
    );

    Ok(())
}
