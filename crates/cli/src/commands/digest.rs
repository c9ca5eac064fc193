//! `deskhand digest` — run the document-summary pipeline once.
//!
//! Collects items from the configured JSONL source, summarizes them, and
//! publishes a markdown page, reporting per-stage progress to the terminal.

use anyhow::{bail, Context};
use deskhand_agent::Producer;
use deskhand_config::AppConfig;
use deskhand_core::history::UserId;
use deskhand_core::interfaces::ProgressSink;
use deskhand_providers::OpenAiCompatClient;
use deskhand_workflow::{digest_pipeline, DigestSettings, WorkflowCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::local_io::{DirectorySink, FileSource};

/// Build the digest coordinator from config. Returns the coordinator and
/// the directory pages land in.
pub(crate) fn build(
    config: &AppConfig,
    progress: Arc<dyn ProgressSink>,
) -> anyhow::Result<(Arc<WorkflowCoordinator>, PathBuf)> {
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
        Producer::new("primary", client.clone(), &config.provider.model)
            .with_temperature(config.provider.temperature),
    );
    let checker = Arc::new(
        Producer::new("checker", client, &config.provider.checker_model).with_temperature(0.0),
    );

    let source_path = config.pipeline.source_path.clone().with_context(|| {
        format!(
            "pipeline.source_path is not configured; point it at a JSONL file of items in {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;
    let source = Arc::new(FileSource::new(source_path));

    let pages_dir = config
        .pipeline
        .pages_dir
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("pages"));
    let sink = Arc::new(DirectorySink::new(pages_dir.clone()));

    let coordinator = digest_pipeline(
        primary,
        checker,
        source,
        sink,
        progress,
        DigestSettings {
            max_attempts: config.retry.max_attempts,
            collect_limit: config.pipeline.collect_limit,
            lookback_days: config.pipeline.lookback_days,
            publish_parent_id: config.pipeline.publish_parent_id.clone(),
        },
    );

    Ok((Arc::new(coordinator), pages_dir))
}

pub async fn run(topic: &str, run_id: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    let progress = Arc::new(deskhand_workflow::TransportProgress::new(
        Arc::new(crate::transport::ConsoleTransport::default()),
        UserId::new("local_user"),
    ));
    let (coordinator, pages_dir) = build(&config, progress)?;

    let run_id = run_id.unwrap_or_else(|| format!("digest-{}", Uuid::new_v4()));
    let run = coordinator
        .execute(&run_id, serde_json::json!({ "topic": topic }))
        .await;

    if run.failed {
        bail!("digest run {run_id} failed; re-run with --run-id {run_id} to resume");
    }

    if let Some(artifact) = run.artifact {
        println!(
            "Published {} to {}",
            artifact["page_id"].as_str().unwrap_or("(unknown page)"),
            pages_dir.display()
        );
    }
    Ok(())
}
