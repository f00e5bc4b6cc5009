//! Composition worker binary.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_ai::{AiServicesConfig, HttpImageGenerator, HttpLipSyncer, HttpSpeechSynthesizer, HttpTranscriber};
use reel_media::{check_ffmpeg, check_ffprobe, SystemRunner};
use reel_models::{Project, ProjectId};
use reel_storage::R2Client;
use reel_worker::{CompositionOrchestrator, EventBus, JsonFileRepository, PipelineEvent, Services, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "reel-worker", version, about = "Compose narrated slideshows and lip-synced reels")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the composition pipeline for one project
    Run {
        /// Project identifier
        project_id: String,
    },
    /// Print the JSON schema of a project document
    Schema,
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("reel=info".parse()?)
        .add_directive("reel_worker=info".parse()?)
        .add_directive("aws_config=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

/// Log every pipeline event until the bus closes.
fn spawn_event_logger(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PipelineEvent::TierFailed { chain, tier, reason, .. }) => {
                    warn!(chain, tier, "Tier failed: {}", reason);
                }
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(event = %json, "Pipeline event"),
                    Err(e) => warn!("Unserializable pipeline event: {}", e),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn run(project_id: String) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let ai = AiServicesConfig::from_env();
    let repository = Arc::new(JsonFileRepository::new(&config.projects_dir));
    let store = R2Client::from_env().await.context("storage client")?;

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<reel_media::FfmpegProgress>();
    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            debug!(
                frame = progress.frame,
                out_time_ms = progress.out_time_ms,
                speed = progress.speed,
                "ffmpeg progress"
            );
        }
    });

    let services = Services {
        projects: repository.clone(),
        profiles: repository,
        images: Arc::new(HttpImageGenerator::new(&ai)?),
        speech: Arc::new(HttpSpeechSynthesizer::new(&ai)?),
        transcriber: Arc::new(HttpTranscriber::new(&ai)?),
        lipsync: Arc::new(HttpLipSyncer::new(&ai)?),
        store: Arc::new(store),
        runner: Arc::new(
            SystemRunner::new()
                .with_timeout(config.ffmpeg_timeout_secs)
                .with_progress(progress_tx),
        ),
    };

    let events = EventBus::default();
    let logger = spawn_event_logger(&events);
    let orchestrator = CompositionOrchestrator::new(services, config).with_events(events);

    let result = orchestrator.run(&ProjectId::from_string(project_id)).await;
    drop(orchestrator);
    logger.await.ok();

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run { project_id } => {
            info!("Starting reel-worker for project {}", project_id);
            run(project_id).await
        }
        Command::Schema => serde_json::to_string_pretty(&schemars::schema_for!(Project))
            .map(|schema| println!("{}", schema))
            .map_err(|e| anyhow!(e)),
    };

    if let Err(e) = outcome {
        error!("reel-worker failed: {:#}", e);
        std::process::exit(1);
    }
}
