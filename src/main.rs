use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use dualplay::config::Config;
use dualplay::player::{
    DefaultEngineFactory, PlayerBackend, PlayerController, PlayerManager, ui_channel,
};
use dualplay::ui::PlaybackTimeLabel;
use dualplay::utils::media_url;

#[derive(Parser)]
#[command(name = "dualplay", about = "Play a URL or file through GStreamer or libmpv")]
struct Cli {
    /// URL or local path of the media
    location: String,
    /// Overrides the backend from the config file
    #[arg(long, value_parser = ["gstreamer", "mpv"])]
    backend: Option<String>,
    /// Start position in seconds
    #[arg(long)]
    resume: Option<f64>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dualplay=debug")),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting dualplay");

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(backend) = &cli.backend {
        config.playback.player_backend = PlayerBackend::from(backend.as_str()).as_str().to_string();
    }
    let url = media_url(&cli.location)?;

    let manager = Arc::new(PlayerManager::new(config.backend()));
    let (ui, ui_loop) = ui_channel();
    let ui_task = tokio::spawn(ui_loop.run());

    let (handle, controller) = PlayerController::new(
        manager.clone(),
        ui,
        Arc::new(DefaultEngineFactory),
        config,
    )
    .context("Failed to start the player")?;
    let controller_task = tokio::spawn(controller.run());

    handle.player_view().await?;
    handle.load(url, cli.resume).await?;

    let label = PlaybackTimeLabel::new(manager.clone());
    let mut ended = manager.did_end().watch();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = ended.changed() => {
                if changed.is_err() || *ended.borrow() {
                    info!("Playback finished");
                    break;
                }
            }
            _ = ticker.tick() => {
                let state = manager.snapshot();
                info!(
                    "[{}] {} playing={} buffering={} speed={}",
                    state.selected_backend,
                    label.text(),
                    state.is_playing,
                    state.is_buffering,
                    state.playback_speed
                );
            }
        }
    }

    let streaming_info = handle.streaming_info().await?;
    println!("{}", serde_json::to_string_pretty(&streaming_info)?);

    handle.stop().await?;
    drop(handle);
    controller_task.await.context("Player controller panicked")?;
    if tokio::time::timeout(Duration::from_secs(1), ui_task).await.is_err() {
        debug!("UI loop still had pending work at exit");
    }

    Ok(())
}
