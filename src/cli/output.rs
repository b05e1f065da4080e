//! CLI output formatting utilities.

use crate::rag::SourceRef;
use crate::ranking::RankedSection;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one ranked section with a content preview.
    pub fn ranked_section(rank: usize, section: &RankedSection) {
        println!(
            "\n{} {} {} - {} (similarity: {:.2}, score: {:.2})",
            style(format!("{}.", rank)).green(),
            style(section.labelled_title()).bold(),
            style(format!("#{}", section.item_id)).dim(),
            style(section.section_kind.display_name()).cyan(),
            section.raw_similarity,
            section.weighted_score
        );
        println!("   {}", content_preview(&section.content, 200));
    }

    /// Print the sources behind an answer, one line each.
    pub fn sources(sources: &[SourceRef]) {
        for source in sources {
            let title = match source.item_year {
                Some(year) => format!("{} ({})", source.item_title, year),
                None => source.item_title.clone(),
            };
            println!(
                "  {} {} - {} ({:.2})",
                style("*").cyan(),
                style(title).bold(),
                source.section_kind.display_name(),
                source.similarity
            );
        }
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Single-line preview, cut at a character boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
