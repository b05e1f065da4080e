//! CLI module for Marquee.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Marquee - conversational Q&A over a movie catalog
///
/// Indexes long-form movie sections, retrieves and ranks them by question
/// intent, and answers with a language model grounded in what it found.
#[derive(Parser, Debug)]
#[command(name = "marquee")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a catalog export into the content store and embed its sections
    Index {
        /// JSON file path, or an http(s) URL to fetch it from
        source: String,
    },

    /// Show the ranked sections a question would retrieve
    Search {
        /// Search query
        query: String,

        /// Number of sections to return (defaults to the configured k)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Restrict the search to one item
        #[arg(short, long)]
        item: Option<i64>,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Ask about one item only
        #[arg(short, long)]
        item: Option<i64>,

        /// Chat model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Start an interactive chat session with streamed answers
    Chat {
        /// Chat about one item only
        #[arg(short, long)]
        item: Option<i64>,

        /// Chat model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_with_item() {
        let cli = Cli::parse_from(["marquee", "-vv", "search", "heist films", "--item", "27205"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Search { query, limit, item } => {
                assert_eq!(query, "heist films");
                assert_eq!(limit, None);
                assert_eq!(item, Some(27205));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::parse_from(["marquee", "serve"]);
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 3000);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
