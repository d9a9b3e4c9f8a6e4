use std::borrow::Cow::{self, Borrowed, Owned};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use jiwon_core::citation;
use jiwon_core::session::{ContextRef, MessageRole, WebPostingRepository};
use jiwon_infrastructure::{JsonConversationRepository, JsonWebPostingRepository};
use jiwon_interaction::{
    ApiConfig, ChatService, HttpChatStream, HttpContextClient, SendStatus, StatusObserver,
};

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: vec!["/reset".to_string(), "/evidence".to_string()],
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

/// Prints streaming status events as dim progress lines.
struct PrintObserver;

impl StatusObserver for PrintObserver {
    fn on_status(&self, message: &str) {
        println!("{}", format!("· {}", message).bright_black());
    }
}

fn usage() -> ! {
    eprintln!("Usage: jiwon-readline <policy_id>");
    eprintln!("       jiwon-readline web <web_id>");
    std::process::exit(2);
}

async fn resolve_context(args: &[String]) -> Result<ContextRef> {
    match args {
        [policy_id] => {
            let policy_id: i64 = policy_id
                .parse()
                .with_context(|| format!("invalid policy id: {policy_id}"))?;
            Ok(ContextRef::Policy { policy_id })
        }
        [mode, web_id] if mode == "web" => {
            let postings = JsonWebPostingRepository::default_location()?;
            let Some(posting) = postings.load(web_id).await else {
                bail!("no stored web posting with id '{web_id}'");
            };
            Ok(ContextRef::WebPosting(posting))
        }
        _ => usage(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let context = resolve_context(&args).await?;
    let document_href = context.document_href();

    // ===== Backend wiring =====
    let config = ApiConfig::load();
    let repository = Arc::new(JsonConversationRepository::default_location()?);
    let transport = Arc::new(HttpChatStream::new(&config)?);
    let remote = Arc::new(HttpContextClient::new(&config)?);

    let service = ChatService::open(context, repository, transport, remote)
        .await
        .with_observer(Arc::new(PrintObserver));

    // ===== REPL Setup =====
    let helper = CliHelper::new();
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    println!("{}", "=== Jiwon Policy Q&A ===".bright_magenta().bold());
    println!(
        "{}",
        "Ask about the policy. '/reset' starts over, '/evidence' lists sources, 'quit' exits."
            .bright_black()
    );

    let restored = service.messages().await;
    if !restored.is_empty() {
        println!(
            "{}",
            format!("Restored {} messages from the previous visit.", restored.len()).yellow()
        );
    }
    println!();

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    service.teardown().await?;
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                if trimmed == "/reset" {
                    service.reset().await?;
                    println!("{}", "Conversation cleared.".yellow());
                    continue;
                }

                if trimmed == "/evidence" {
                    print_evidence(&service).await;
                    continue;
                }

                match service.send_message(trimmed).await? {
                    SendStatus::Rejected => {
                        println!("{}", "A turn is still in progress.".yellow());
                    }
                    SendStatus::Completed => print_answer(&service, &document_href).await,
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                service.teardown().await?;
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    Ok(())
}

async fn print_answer(service: &ChatService, document_href: &str) {
    let messages = service.messages().await;
    let Some(answer) = messages.iter().rev().find(|m| m.role == MessageRole::Assistant) else {
        return;
    };

    let resolved = citation::resolve(&answer.content, &answer.evidence, document_href);
    for line in resolved.to_markdown().lines() {
        println!("{}", line.bright_blue());
    }
    if !answer.evidence.is_empty() {
        println!(
            "{}",
            format!("({} sources, '/evidence' to list)", answer.evidence.len()).bright_black()
        );
    }
    println!();
}

async fn print_evidence(service: &ChatService) {
    let messages = service.messages().await;
    let Some(answer) = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant && !m.evidence.is_empty())
    else {
        println!("{}", "No evidence attached yet.".bright_black());
        return;
    };

    for (i, evidence) in answer.evidence.iter().enumerate() {
        let origin = match (&evidence.title, &evidence.url) {
            (Some(title), Some(url)) => format!("{} <{}>", title, url),
            (None, Some(url)) => format!("<{}>", url),
            _ => evidence
                .chunk_id
                .clone()
                .unwrap_or_else(|| "policy document".to_string()),
        };
        println!("{}", format!("[{}] {}", i + 1, origin).bright_magenta());
        for line in evidence.content.lines().take(3) {
            println!("    {}", line.bright_black());
        }
    }
    println!();
}
