//! Interactive chat command with streamed answers.

use crate::app::App;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::catalog::ItemId;
use crate::rag::{ChatEvent, ChatRequest, ResponseOutcome, SourceRef};
use anyhow::Result;
use console::style;
use futures::{pin_mut, StreamExt};
use std::io::{self, BufRead, Write};

/// Conversation state carried between prompts.
#[derive(Debug)]
struct ChatSession {
    conversation_id: Option<String>,
    item: Option<ItemId>,
}

impl ChatSession {
    fn new(item: Option<ItemId>) -> Self {
        Self {
            conversation_id: None,
            item,
        }
    }

    fn request(&self, message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            conversation_id: self.conversation_id.clone(),
            item_id: self.item,
        }
    }

    /// Continue the conversation the server assigned on `Done`.
    fn record(&mut self, event: &ChatEvent) {
        if let ChatEvent::Done { metadata, .. } = event {
            if metadata.conversation_id.is_some() {
                self.conversation_id = metadata.conversation_id.clone();
            }
        }
    }

    fn clear(&mut self) {
        self.conversation_id = None;
    }
}

/// Run the interactive chat command.
pub async fn run_chat(item: Option<i64>, model: Option<String>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Answer, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let app = App::new(settings)?;
    let orchestrator = app.orchestrator(model.as_deref())?;

    if let Some(item_id) = item {
        match app.content_store().get_item(item_id).await? {
            Some(found) => Output::info(&format!("Chatting about {}", found.labelled_title())),
            None => {
                Output::error(&format!("Item {} not found", item_id));
                return Err(anyhow::anyhow!("Item {} not found", item_id));
            }
        }
    }

    println!("\n{}", style("Marquee Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to start a new conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut session = ChatSession::new(item);

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        let events = orchestrator.respond_stream(session.request(input));
        pin_mut!(events);

        let mut sources: Vec<SourceRef> = Vec::new();
        let mut streamed = false;
        while let Some(event) = events.next().await {
            session.record(&event);
            match event {
                ChatEvent::Sources { sources: found } => sources = found,
                ChatEvent::Token { content } => {
                    if !streamed {
                        print!("\n{} ", style("Marquee:").cyan().bold());
                        streamed = true;
                    }
                    print!("{}", content);
                    stdout.flush()?;
                }
                ChatEvent::Done { message, metadata } => {
                    if !streamed {
                        println!("\n{} {}", style("Marquee:").cyan().bold(), message);
                    } else {
                        println!();
                    }
                    if metadata.outcome == ResponseOutcome::Answered && !sources.is_empty() {
                        println!();
                        Output::sources(&sources);
                    }
                    println!();
                }
                ChatEvent::Error { message } => {
                    if streamed {
                        println!();
                    }
                    Output::error(&message);
                }
                ChatEvent::RetrievalStarted | ChatEvent::GenerationStarted => {}
            }
        }
    }

    Ok(())
}
