//! `railchat chat`: interactive or single-message chat mode.

use std::io::{BufRead, Write};

use railchat_agent::ChatLoop;
use railchat_config::AppConfig;
use railchat_core::{ConversationTurn, DomainEvent};
use tokio_stream::StreamExt;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Err(e) = config.require_credentials() {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set these environment variables:");
        eprintln!("    OPENAI_API_KEY = 'sk-...'");
        eprintln!("    RAPIDAPI_KEY   = '...'");
        eprintln!();
        return Err(e.into());
    }

    let chat = railchat_gateway::build_chat_loop(&config)?;

    if let Some(msg) = message {
        converse(&chat, msg, Vec::new()).await;
        return Ok(());
    }

    println!();
    println!("  Railchat: Interactive Mode");
    println!();
    println!("  Model:  {}", config.model.model);
    println!("  Tools:  {}", config.rpc.endpoint);
    println!();
    println!("  Ask about PNR status, trains, stations, fares or seats.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<ConversationTurn> = Vec::new();
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = converse(&chat, input.to_string(), history.clone()).await;
        history.push(ConversationTurn::user(input));
        if let Some(text) = reply {
            history.push(ConversationTurn::assistant(text));
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one message through the loop, rendering events as they arrive.
/// Returns the final answer, if one was produced.
async fn converse(chat: &ChatLoop, message: String, history: Vec<ConversationTurn>) -> Option<String> {
    let mut run = chat.run(message, history);
    let mut answer = None;

    while let Some(event) = run.next().await {
        if let Some(line) = render(&event) {
            println!("{line}");
        }
        if let DomainEvent::Response { text } = event {
            answer = Some(text);
        }
    }
    answer
}

fn render(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::Thinking { text } => Some(format!("  ... {text}")),
        DomainEvent::ToolStart { name, args, .. } => Some(format!("  [tool] {name} {args}")),
        DomainEvent::ToolComplete { name, .. } => Some(format!("  [tool] {name} ok")),
        DomainEvent::ToolError { name, error, .. } => {
            Some(format!("  [tool] {name} failed: {}", error.message))
        }
        DomainEvent::Response { text } => Some(
            text.lines()
                .map(|line| format!("  Assistant > {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        DomainEvent::Error { message } => Some(format!("  [Error] {message}")),
        DomainEvent::Done => None,
    }
}
