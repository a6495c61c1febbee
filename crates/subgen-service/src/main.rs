//! Subtitle transcription service binary.
//!
//! Submits the media files given on the command line, follows their
//! progress, and writes the finished subtitles next to each input.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subgen_media::WhisperCliTranscriber;
use subgen_service::{ServiceConfig, SubtitleService};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("subgen=info".parse().unwrap());

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

    let inputs: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if inputs.is_empty() {
        eprintln!("usage: subgen <media-file>...");
        std::process::exit(2);
    }

    if let Err(e) = run(inputs).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(inputs: Vec<PathBuf>) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env();
    info!(data_dir = %config.data_dir.display(), "starting subgen");

    let transcriber = Arc::new(
        WhisperCliTranscriber::from_env().context("whisper CLI not available")?,
    );
    let service = Arc::new(SubtitleService::new(config, transcriber).await?);
    let _handles = service.start();

    let mut tasks = Vec::new();
    for input in inputs {
        let bytes = tokio::fs::read(&input)
            .await
            .with_context(|| format!("read {}", input.display()))?;
        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .context("input has no usable filename")?;

        let view = service.submit(&bytes, filename).await?;
        info!(job_id = %view.job_id, file = filename, "submitted");
        tasks.push(tokio::spawn(follow(service.clone(), view.job_id, input.clone())));
    }

    for task in tasks {
        task.await.context("follower task panicked")??;
    }

    service.shutdown();
    Ok(())
}

/// Follow one job to completion and save its subtitles beside the input.
async fn follow(
    service: Arc<SubtitleService>,
    job_id: subgen_models::JobId,
    input: PathBuf,
) -> anyhow::Result<()> {
    let mut updates = service.subscribe(&job_id).await?;
    let mut last = None;
    while let Some(view) = updates.next().await {
        info!(
            job_id = %view.job_id,
            state = %view.state,
            progress = view.progress,
            phase = view.phase.as_deref().unwrap_or("-"),
            "status"
        );
        last = Some(view);
    }

    let final_view = match last {
        Some(v) if v.is_terminal() => v,
        // Stream should only close at a terminal view; re-poll to be sure
        _ => service.poll(&job_id).await?,
    };

    if let Some(err) = &final_view.error {
        anyhow::bail!("job {} failed: {}", job_id, err.message);
    }

    let out_dir = input.parent().unwrap_or(Path::new("."));
    for language in final_view.available_languages {
        let (bytes, filename) = service.fetch_artifact(&job_id, &language).await?;
        let dest = out_dir.join(&filename);
        tokio::fs::write(&dest, bytes)
            .await
            .with_context(|| format!("write {}", dest.display()))?;
        info!(job_id = %job_id, path = %dest.display(), "wrote subtitles");
    }
    Ok(())
}
