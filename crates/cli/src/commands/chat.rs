//! `deskhand chat` — interactive or single-message chat mode.
//!
//! Interactive commands:
//! - `/spec <task>`   — enter the multi-turn elicitation dialogue for a task
//! - `/digest <topic>` — start a digest run in the background; progress
//!   arrives as status-message updates while the chat stays responsive
//! - `/reset`         — hard reset: forget history and session state
//! - `exit` / `quit`  — leave

use anyhow::Context;
use deskhand_agent::{ChatOrchestrator, Producer, RetryEngine, SessionStore};
use deskhand_config::AppConfig;
use deskhand_core::history::UserId;
use deskhand_core::interfaces::ChatTransport;
use deskhand_history::InteractionLog;
use deskhand_providers::OpenAiCompatClient;
use deskhand_workflow::TransportProgress;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::transport::ConsoleTransport;

const BASE_PROMPT: &str = "You are deskhand, a careful assistant. Be concise and concrete. \
     When a conversation grows long, you may return a JSON object with a \
     \"compressed_context\" field condensing what matters so far.";

/// Build the orchestrator from config.
pub(crate) fn build_orchestrator(config: &AppConfig) -> anyhow::Result<ChatOrchestrator> {
    let api_key = config
        .provider
        .api_key
        .clone()
        .context("No API key configured. Set DESKHAND_API_KEY or add it to config.toml.")?;

    let client = Arc::new(OpenAiCompatClient::new(
        "openai",
        &config.provider.base_url,
        api_key,
        config.provider.timeout_secs,
    ));

    let primary = Arc::new(
        Producer::new("primary", client, &config.provider.model)
            .with_temperature(config.provider.temperature),
    );

    let log_path = config
        .history
        .log_path
        .clone()
        .unwrap_or_else(AppConfig::default_log_path);
    let log = Arc::new(InteractionLog::with_log_file(log_path));

    let sessions = Arc::new(SessionStore::new(
        config.elicitation.turn_budget,
        config.elicitation.accelerate_threshold,
    ));

    Ok(ChatOrchestrator::new(
        primary,
        log,
        sessions,
        RetryEngine::new(config.retry.max_attempts),
        BASE_PROMPT,
    ))
}

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let orchestrator = build_orchestrator(&config)?;
    let transport = ConsoleTransport::default();
    let user = UserId::new("local_user");

    if let Some(text) = message {
        let reply = orchestrator.handle_message(&user, &text).await;
        transport.send(&user, &reply.text).await.ok();
        return Ok(());
    }

    println!("deskhand — type a message, /spec <task>, /reset, or exit");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "exit" | "quit" | "/exit" | "/quit" => break,
            "/reset" => {
                orchestrator.reset(&user).await;
                println!("(context cleared)");
            }
            _ => {
                if let Some(task) = line.strip_prefix("/spec ") {
                    let budget = orchestrator.begin_elicitation(&user, task.trim()).await;
                    println!("(eliciting details — up to {budget} turns)");
                    continue;
                }

                if let Some(topic) = line.strip_prefix("/digest ") {
                    // Detached: the chat loop stays responsive while the
                    // pipeline reports progress through message edits.
                    let progress = Arc::new(TransportProgress::new(
                        Arc::new(ConsoleTransport::default()),
                        user.clone(),
                    ));
                    match super::digest::build(&config, progress) {
                        Ok((coordinator, _)) => {
                            let run_id = format!("digest-{}", Uuid::new_v4());
                            let input = serde_json::json!({ "topic": topic.trim() });
                            tokio::spawn(async move {
                                coordinator.execute(&run_id, input).await;
                            });
                            println!("(digest started)");
                        }
                        Err(e) => println!("(cannot start digest: {e})"),
                    }
                    continue;
                }

                let reply = orchestrator.handle_message(&user, line).await;
                let text = if reply.finalized {
                    format!("{}\n(final)", reply.text)
                } else {
                    reply.text
                };
                transport.send(&user, &text).await.ok();
            }
        }
    }

    Ok(())
}
