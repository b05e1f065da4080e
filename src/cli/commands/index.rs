//! Index command implementation.

use crate::app::App;
use crate::catalog::{parse_catalog, CatalogEntry};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::{Context, Result};

/// Run the index command.
pub async fn run_index(source: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Index, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let spinner = Output::spinner(&format!("Loading catalog from {}...", source));
    let entries = load_catalog(source).await;
    spinner.finish_and_clear();
    let entries = entries?;

    if entries.is_empty() {
        Output::warning("The catalog is empty, nothing to index.");
        return Ok(());
    }
    Output::info(&format!("Indexing {} items", entries.len()));

    let app = App::new(settings)?;
    let progress = Output::progress_bar(entries.len() as u64, "items");

    let result = app
        .index_catalog(&entries, |entry| {
            progress.set_message(entry.title.clone());
            progress.inc(1);
        })
        .await;
    progress.finish_and_clear();

    match result {
        Ok(report) => {
            Output::success(&format!(
                "Indexed {} sections from {} items",
                report.sections, report.items
            ));
            if report.skipped > 0 {
                Output::kv("Empty sections skipped", &report.skipped.to_string());
            }
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Indexing failed: {}", e));
            Err(e.into())
        }
    }
}

/// Read a catalog export from a file or an http(s) URL.
async fn load_catalog(source: &str) -> Result<Vec<CatalogEntry>> {
    let json = if source.starts_with("http://") || source.starts_with("https://") {
        reqwest::get(source)
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to fetch {}", source))?
            .text()
            .await?
    } else {
        let path = Settings::expand_path(source);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    parse_catalog(&json).with_context(|| format!("{} is not a valid catalog export", source))
}
