mod agent;
mod capabilities;
mod cli;
mod config;
mod errors;
mod materialize;
mod notify;
mod panel;
mod server;
mod service;
mod util;
mod workflow;

use std::{path::Path, sync::Arc};

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::{
    capabilities::CapabilityMatrix,
    cli::{Cli, Commands, GenerateArgs},
    config::AppConfig,
    notify::NOTIFY_EVENT,
    server::AppState,
    service::{FileUpload, GenerationService, HttpGenerationService},
    util::{ArtifactWriter, format_local, now_local},
    workflow::{DispatchOutcome, WorkflowRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let service: Arc<dyn GenerationService> =
        Arc::new(HttpGenerationService::new(&config.service)?);
    let capabilities = Arc::new(CapabilityMatrix::new(&config.availability));
    let (broadcaster, _bus_rx) = notify::message_bus();

    let workflows = Arc::new(WorkflowRegistry::new(
        config.panels.clone(),
        Arc::clone(&service),
        Arc::clone(&capabilities),
        &broadcaster,
        &config.workflow,
    ));

    match cli.command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or(config.server.bind_addr);
            let state = AppState::new(
                workflows,
                capabilities,
                broadcaster,
                config.server.max_upload_bytes,
            );
            server::run_server(addr, state).await?;
        }
        Commands::Generate(args) => {
            let mut rx = broadcaster.subscribe();
            let outcome = run_generate(&config, &workflows, &args).await;
            log_notifications(&mut rx);
            outcome?;
        }
        Commands::Agents => {
            println!("{}", capabilities.help_message());
            println!();
            println!("Panels:");
            for workflow in workflows.iter() {
                let panel = workflow.panel();
                let status = if workflow.is_available() {
                    "available"
                } else {
                    "under construction"
                };
                println!("- {:<16} {:<36} {}", panel.id, panel.title, status);
            }
        }
        Commands::Ping => {
            let message = service
                .health()
                .await
                .with_context(|| format!("generation service at {} is unreachable", config.service.base_url))?;
            println!("{}: {}", config.service.base_url, message);
        }
    }

    Ok(())
}

async fn run_generate(
    config: &AppConfig,
    workflows: &WorkflowRegistry,
    args: &GenerateArgs,
) -> anyhow::Result<()> {
    let workflow = workflows.get(&args.panel)?;

    let mut request = workflow.request(args.text.clone()).with_options(args.options());
    if let Some(path) = &args.file {
        request = request.with_file(read_upload(path).await?);
    }

    let outcome = workflow.dispatch(request).await?;
    println!("{}", outcome.result().content);

    if let DispatchOutcome::Generated { file: Some(file), .. } = &outcome {
        info!(target: "workflow", file = %file.name, "generated from uploaded file");
    }

    if args.no_download {
        return Ok(());
    }

    let out_dir = args.out.clone().unwrap_or_else(|| config.artifacts_dir.clone());
    let writer = ArtifactWriter::new(out_dir).await?;
    let artifact = workflow.download().await?;
    let path = writer.persist(&artifact).await?;
    println!("saved {}", path.display());

    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<FileUpload> {
    let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
        bail!("{} is not a file", path.display());
    };
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(FileUpload::new(name, data))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_timer(LocalTimer)
        .init();
}

/// Mirrors queued notification events onto the log.
fn log_notifications(rx: &mut broadcast::Receiver<String>) {
    loop {
        match rx.try_recv() {
            Ok(raw) => {
                let Ok(message) = serde_json::from_str::<Value>(&raw) else {
                    continue;
                };
                if message["event"] != NOTIFY_EVENT {
                    continue;
                }
                let payload = &message["payload"];
                let text = payload["message"].as_str().unwrap_or_default();
                match payload["severity"].as_str() {
                    Some("error") => error!(target: "workflow", "{text}"),
                    _ => info!(target: "workflow", "{text}"),
                }
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(target: "workflow", skipped, "notification log lagged");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_local(&now_local(), "%Y-%m-%d %H:%M:%S%:z"))
    }
}
