//! Terminal chat client for a streaming agent server.
//!
//! Usage:
//!   cargo run --example chat
//!   cargo run --example chat -- --base-url http://localhost:5000 --session-file .chat-session.json
//!   CHAT_STREAM_BASE_URL=http://agent:5000 cargo run --example chat
//!
//! Ctrl-C stops the reply in progress. Type "/new" for a fresh session,
//! "/tools" to list the agent's tools, "exit" / "quit" to leave.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chat_stream::tools::DISPLAY_RESULT_CHARS;
use chat_stream::{
    truncate_for_display, EngineConfig, ExchangeEnd, ExchangeOutcome, InvocationStatus,
    RenderSink, Role, SessionEngine, SessionMessage, Severity, Status, ToolCatalog,
    ToolInvocation,
};
use clap::Parser;

#[derive(Parser)]
#[command(name = "chat", about = "Chat with a streaming agent")]
struct Cli {
    /// Agent server base URL (overrides CHAT_STREAM_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// File to persist the session id in (overrides CHAT_STREAM_SESSION_FILE)
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Show status transitions
    #[arg(long)]
    show_status: bool,
}

/// Prints only the new part of each content update.
struct TerminalSink {
    printed: Mutex<usize>,
    show_status: bool,
}

impl RenderSink for TerminalSink {
    fn on_content_update(&self, full_text: &str) {
        let mut printed = self.printed.lock().unwrap_or_else(|e| e.into_inner());
        if *printed == 0 {
            eprint!("\x1b[1;32magent>\x1b[0m ");
        }
        print!("{}", &full_text[*printed..]);
        io::stdout().flush().ok();
        *printed = full_text.len();
    }

    fn on_tool_opened(&self, invocation: &ToolInvocation) {
        eprintln!("\x1b[33m  [tool: {}]\x1b[0m {}", invocation.tool, invocation.args);
    }

    fn on_tool_closed(&self, invocation: &ToolInvocation) {
        let tag = match invocation.status {
            InvocationStatus::Succeeded => "result",
            _ => "error",
        };
        let shown = truncate_for_display(
            invocation.result.as_deref().unwrap_or(""),
            DISPLAY_RESULT_CHARS,
        );
        eprintln!("\x1b[33m  [{tag}: {}]\x1b[0m {shown}", invocation.tool);
    }

    fn on_status_changed(&self, status: Status) {
        if self.show_status {
            eprintln!("\x1b[2m  ● {status}\x1b[0m");
        }
    }

    fn on_system_message(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Error => eprintln!("\x1b[1;31merror:\x1b[0m {text}"),
            Severity::Success => eprintln!("\x1b[32m{text}\x1b[0m"),
            Severity::Info => eprintln!("\x1b[2m{text}\x1b[0m"),
        }
    }

    fn on_history(&self, messages: &[SessionMessage]) {
        for msg in messages {
            let who = match msg.role {
                Role::User => "you",
                Role::Assistant => "agent",
                Role::System => "system",
            };
            eprintln!("\x1b[2m{who}> {}\x1b[0m", msg.content);
        }
    }

    fn on_exchange_end(&self, outcome: &ExchangeOutcome) {
        let mut printed = self.printed.lock().unwrap_or_else(|e| e.into_inner());
        if *printed > 0 {
            println!();
        }
        *printed = 0;
        if outcome.end == ExchangeEnd::Aborted {
            eprintln!("\x1b[2m  (stopped)\x1b[0m");
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    if let Some(path) = cli.session_file {
        config.session_file = Some(path);
    }

    let sink = TerminalSink {
        printed: Mutex::new(0),
        show_status: cli.show_status,
    };
    let engine = Arc::new(SessionEngine::from_config(&config, sink));
    let catalog = config.tool_catalog(config.http_client());

    eprintln!("chat-stream");
    eprintln!("server: {}", config.base_url);
    eprintln!("---");

    if let Err(e) = engine.restore_session().await {
        eprintln!("\x1b[1;31merror:\x1b[0m {e}");
    }

    tokio::spawn({
        let engine = engine.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !engine.stop() {
                    std::process::exit(130);
                }
            }
        }
    });

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("\x1b[1;36myou>\x1b[0m ");
        io::stderr().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "exit" | "quit" | "/q") {
            break;
        }
        if trimmed == "/new" {
            match engine.new_chat().await {
                Ok(()) => eprintln!("\x1b[2m(new session)\x1b[0m"),
                Err(e) => eprintln!("\x1b[1;31merror:\x1b[0m {e}"),
            }
            continue;
        }
        if trimmed == "/tools" {
            match catalog.list().await {
                Ok(tools) if tools.is_empty() => eprintln!("\x1b[2m(no tools)\x1b[0m"),
                Ok(tools) => {
                    for tool in tools {
                        eprintln!(
                            "\x1b[33m  {}\x1b[0m \x1b[2m[{}]\x1b[0m {}",
                            tool.name,
                            tool.server,
                            truncate_for_display(&tool.description, 80)
                        );
                    }
                }
                Err(e) => eprintln!("\x1b[1;31merror:\x1b[0m {e}"),
            }
            continue;
        }

        if let Err(e) = engine.submit(trimmed).await {
            eprintln!("\x1b[1;31merror:\x1b[0m {e}");
        }

        let stats = engine.tool_stats();
        if stats.opened > 0 {
            eprintln!(
                "\x1b[2m  [tools: {} run, {} ok]\x1b[0m",
                stats.opened, stats.succeeded
            );
        }
    }

    eprintln!("bye.");
}
