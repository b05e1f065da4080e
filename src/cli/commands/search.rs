//! Search command implementation.

use crate::app::App;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::{validate, RetrievalRequest};
use crate::vector_store::SearchFilter;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: Option<usize>,
    item: Option<i64>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let query = validate::prepare_message(query)?;
    let app = App::new(settings)?;

    let mode = match item {
        Some(_) => &app.settings().retrieval.item,
        None => &app.settings().retrieval.global,
    };
    let intent = app.classifier().classify(&query, false);
    Output::kv("Intent", intent.as_str());

    let pipeline = app.pipeline();
    let spinner = Output::spinner("Searching...");
    let results = pipeline
        .retrieve(&RetrievalRequest {
            query: &query,
            digest: None,
            intent,
            filter: item.map(SearchFilter::item),
            k: limit.unwrap_or(mode.k),
        })
        .await;
    spinner.finish_and_clear();

    match results {
        Ok(sections) => {
            if sections.is_empty() {
                Output::warning("No sections found matching your query.");
            } else {
                Output::success(&format!("Found {} sections", sections.len()));
                for (i, section) in sections.iter().enumerate() {
                    Output::ranked_section(i + 1, section);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
