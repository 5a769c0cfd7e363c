use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::dispatch::UiContext;
use super::factory::{EngineFactory, Player};
use super::manager::{ManagerSink, PlayerManager};
use super::traits::MediaPlayer;
use super::types::{
    PlayerBackend, RenderSurface, SeekCompletion, StreamingInfo, Thumbnail, ThumbnailCompletion,
    TrackInfo, TrackSelector,
};
use crate::config::Config;
use crate::utils::errors::PlayerError;

/// Commands that can be sent to the player controller
#[derive(Debug)]
pub enum PlayerCommand {
    Load {
        url: Url,
        resume_position: Option<f64>,
        respond_to: oneshot::Sender<()>,
    },
    Play {
        respond_to: oneshot::Sender<()>,
    },
    Pause {
        respond_to: oneshot::Sender<()>,
    },
    Stop {
        respond_to: oneshot::Sender<()>,
    },
    /// The completion is awaited by the caller, not by the controller
    Seek {
        seconds: f64,
        respond_to: oneshot::Sender<SeekCompletion>,
    },
    SetPlaybackSpeed {
        speed: f32,
        respond_to: oneshot::Sender<()>,
    },
    GetTimes {
        respond_to: oneshot::Sender<PlaybackTimes>,
    },
    GetTracks {
        respond_to: oneshot::Sender<TrackListing>,
    },
    SelectAudioTrack {
        selector: TrackSelector,
        respond_to: oneshot::Sender<()>,
    },
    SelectSubtitleTrack {
        selector: Option<TrackSelector>,
        respond_to: oneshot::Sender<()>,
    },
    SelectVideoTrack {
        selector: TrackSelector,
        respond_to: oneshot::Sender<()>,
    },
    PlayerView {
        respond_to: oneshot::Sender<Option<RenderSurface>>,
    },
    StartPip {
        respond_to: oneshot::Sender<()>,
    },
    StopPip {
        respond_to: oneshot::Sender<()>,
    },
    GenerateThumbnail {
        seconds: f64,
        respond_to: oneshot::Sender<ThumbnailCompletion>,
    },
    HandlePinch {
        scale: f64,
        respond_to: oneshot::Sender<()>,
    },
    GetStreamingInfo {
        respond_to: oneshot::Sender<StreamingInfo>,
    },
    GetBackend {
        respond_to: oneshot::Sender<Option<PlayerBackend>>,
    },
    SwitchBackend {
        backend: PlayerBackend,
        respond_to: oneshot::Sender<Result<(), PlayerError>>,
    },
}

/// Clock values read from the active adapter in one round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackTimes {
    pub current_time: f64,
    pub duration: f64,
    pub buffered_duration: f64,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub playback_speed: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackListing {
    pub audio: Vec<TrackInfo>,
    pub subtitles: Vec<TrackInfo>,
    pub video: Vec<TrackInfo>,
    pub current_audio: Option<TrackInfo>,
    pub current_subtitle: Option<TrackInfo>,
}

/// Controller that owns the active adapter and processes commands
pub struct PlayerController {
    player: Option<Player>,
    receiver: mpsc::UnboundedReceiver<PlayerCommand>,
    manager: Arc<PlayerManager>,
    ui: UiContext,
    engines: Arc<dyn EngineFactory>,
    config: Config,
    last_url: Option<Url>,
}

impl PlayerController {
    /// Create the controller with the configured backend already active
    pub fn new(
        manager: Arc<PlayerManager>,
        ui: UiContext,
        engines: Arc<dyn EngineFactory>,
        config: Config,
    ) -> Result<(PlayerHandle, PlayerController)> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut controller = PlayerController {
            player: None,
            receiver,
            manager,
            ui,
            engines,
            config,
            last_url: None,
        };
        controller.activate(controller.config.backend())?;

        let handle = PlayerHandle {
            sender,
            thumbnail_timeout: Duration::from_millis(controller.config.thumbnails.timeout_ms),
        };

        Ok((handle, controller))
    }

    fn activate(&mut self, backend: PlayerBackend) -> Result<(), PlayerError> {
        let epoch = self.manager.activate_backend(backend);
        let sink = ManagerSink::new(self.manager.clone(), self.ui.clone(), epoch);
        let player = Player::new(backend, &self.config, self.engines.as_ref(), sink)?;
        self.player = Some(player);
        Ok(())
    }

    fn media(&self) -> Option<&dyn MediaPlayer> {
        self.player.as_ref().map(Player::as_media_player)
    }

    /// Replace the active adapter, carrying the current item over.
    async fn switch_backend(&mut self, backend: PlayerBackend) -> Result<(), PlayerError> {
        let previous = self.player.as_ref().map(Player::backend);
        if previous == Some(backend) {
            debug!("{} backend already active", backend);
            return Ok(());
        }

        info!("Switching player backend from {:?} to {}", previous, backend);
        let resume_at = self.manager.current_time().get();

        // Observers must be gone before the engine handle is released
        if let Some(old) = self.player.take() {
            old.teardown();
            drop(old);
        }

        let result = match self.activate(backend) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Failed to activate {} backend: {}", backend, e);
                if let Some(previous) = previous
                    && let Err(restore) = self.activate(previous)
                {
                    error!("Failed to restore {} backend: {}", previous, restore);
                }
                Err(e)
            }
        };

        if let (Some(player), Some(url)) = (&self.player, &self.last_url) {
            let resume = (resume_at > 0.0).then_some(resume_at);
            debug!("Reloading {} at {:?}", url, resume);
            player.load(url, resume).await;
        }

        result
    }

    /// Run the controller event loop
    pub async fn run(mut self) {
        debug!("PlayerController event loop started");

        while let Some(command) = self.receiver.recv().await {
            match command {
                PlayerCommand::Load {
                    url,
                    resume_position,
                    respond_to,
                } => {
                    trace!("Loading media: {}", url);
                    if let Some(player) = &self.player {
                        player.load(&url, resume_position).await;
                    } else {
                        warn!("No active backend, cannot load {}", url);
                    }
                    self.last_url = Some(url);
                    let _ = respond_to.send(());
                }
                PlayerCommand::Play { respond_to } => {
                    trace!("Starting playback");
                    if let Some(p) = self.media() {
                        p.play();
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::Pause { respond_to } => {
                    trace!("Pausing playback");
                    if let Some(p) = self.media() {
                        p.pause();
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::Stop { respond_to } => {
                    trace!("Stopping playback");
                    if let Some(p) = self.media() {
                        p.stop();
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::Seek {
                    seconds,
                    respond_to,
                } => {
                    trace!("Seeking to {:.3}s", seconds);
                    let completion = match self.media() {
                        Some(p) => p.seek(seconds),
                        None => {
                            let (sender, completion) = oneshot::channel();
                            let _ = sender.send(false);
                            completion
                        }
                    };
                    let _ = respond_to.send(completion);
                }
                PlayerCommand::SetPlaybackSpeed { speed, respond_to } => {
                    trace!("Setting playback speed to {}", speed);
                    if let Some(p) = self.media() {
                        p.set_playback_speed(speed);
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::GetTimes { respond_to } => {
                    let times = self
                        .media()
                        .map(|p| PlaybackTimes {
                            current_time: p.current_time(),
                            duration: p.duration(),
                            buffered_duration: p.buffered_duration(),
                            is_playing: p.is_playing(),
                            is_buffering: p.is_buffering(),
                            playback_speed: p.playback_speed(),
                        })
                        .unwrap_or_default();
                    let _ = respond_to.send(times);
                }
                PlayerCommand::GetTracks { respond_to } => {
                    let listing = self
                        .media()
                        .map(|p| TrackListing {
                            audio: p.audio_tracks(),
                            subtitles: p.subtitle_tracks(),
                            video: p.video_tracks(),
                            current_audio: p.current_audio_track(),
                            current_subtitle: p.current_subtitle_track(),
                        })
                        .unwrap_or_default();
                    let _ = respond_to.send(listing);
                }
                PlayerCommand::SelectAudioTrack {
                    selector,
                    respond_to,
                } => {
                    trace!("Selecting audio track {:?}", selector);
                    if let Some(p) = self.media() {
                        p.select_audio_track(&selector);
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::SelectSubtitleTrack {
                    selector,
                    respond_to,
                } => {
                    trace!("Selecting subtitle track {:?}", selector);
                    if let Some(p) = self.media() {
                        p.select_subtitle_track(selector.as_ref());
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::SelectVideoTrack {
                    selector,
                    respond_to,
                } => {
                    trace!("Selecting video track {:?}", selector);
                    if let Some(p) = self.media() {
                        p.select_video_track(&selector);
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::PlayerView { respond_to } => {
                    let _ = respond_to.send(self.media().map(|p| p.player_view()));
                }
                PlayerCommand::StartPip { respond_to } => {
                    if let Some(p) = self.media() {
                        p.start_pip();
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::StopPip { respond_to } => {
                    if let Some(p) = self.media() {
                        p.stop_pip();
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::GenerateThumbnail {
                    seconds,
                    respond_to,
                } => {
                    trace!("Generating thumbnail at {:.3}s", seconds);
                    let completion = match self.media() {
                        Some(p) => p.generate_thumbnail(seconds),
                        None => {
                            let (sender, completion) = oneshot::channel();
                            let _ = sender.send(None);
                            completion
                        }
                    };
                    let _ = respond_to.send(completion);
                }
                PlayerCommand::HandlePinch { scale, respond_to } => {
                    if let Some(p) = self.media() {
                        p.handle_pinch(scale);
                    }
                    let _ = respond_to.send(());
                }
                PlayerCommand::GetStreamingInfo { respond_to } => {
                    let info = self
                        .media()
                        .map(|p| p.streaming_info())
                        .unwrap_or_else(StreamingInfo::placeholder);
                    let _ = respond_to.send(info);
                }
                PlayerCommand::GetBackend { respond_to } => {
                    let _ = respond_to.send(self.player.as_ref().map(Player::backend));
                }
                PlayerCommand::SwitchBackend {
                    backend,
                    respond_to,
                } => {
                    let result = self.switch_backend(backend).await;
                    let _ = respond_to.send(result);
                }
            }
        }

        if let Some(player) = self.player.take() {
            player.teardown();
        }
        debug!("PlayerController event loop terminated");
    }
}

/// Handle to communicate with the player controller
#[derive(Clone)]
pub struct PlayerHandle {
    sender: mpsc::UnboundedSender<PlayerCommand>,
    thumbnail_timeout: Duration,
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl PlayerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand,
    ) -> Result<T> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(command(respond_to))
            .map_err(|_| PlayerError::ControllerDisconnected)?;
        Ok(response.await.map_err(|_| PlayerError::NoResponse)?)
    }

    /// Load media, optionally resuming at `resume_position` seconds
    pub async fn load(&self, url: Url, resume_position: Option<f64>) -> Result<()> {
        self.request(|respond_to| PlayerCommand::Load {
            url,
            resume_position,
            respond_to,
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(|respond_to| PlayerCommand::Play { respond_to })
            .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|respond_to| PlayerCommand::Pause { respond_to })
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|respond_to| PlayerCommand::Stop { respond_to })
            .await
    }

    /// Seek and wait for the engine. `false` means the seek failed or a
    /// newer one replaced it.
    pub async fn seek(&self, seconds: f64) -> Result<bool> {
        let completion = self
            .request(|respond_to| PlayerCommand::Seek {
                seconds,
                respond_to,
            })
            .await?;
        Ok(completion.await.unwrap_or(false))
    }

    pub async fn set_playback_speed(&self, speed: f32) -> Result<()> {
        self.request(|respond_to| PlayerCommand::SetPlaybackSpeed { speed, respond_to })
            .await
    }

    pub async fn times(&self) -> Result<PlaybackTimes> {
        self.request(|respond_to| PlayerCommand::GetTimes { respond_to })
            .await
    }

    pub async fn tracks(&self) -> Result<TrackListing> {
        self.request(|respond_to| PlayerCommand::GetTracks { respond_to })
            .await
    }

    pub async fn select_audio_track(&self, selector: TrackSelector) -> Result<()> {
        self.request(|respond_to| PlayerCommand::SelectAudioTrack {
            selector,
            respond_to,
        })
        .await
    }

    /// `None` turns subtitles off
    pub async fn select_subtitle_track(&self, selector: Option<TrackSelector>) -> Result<()> {
        self.request(|respond_to| PlayerCommand::SelectSubtitleTrack {
            selector,
            respond_to,
        })
        .await
    }

    pub async fn select_video_track(&self, selector: TrackSelector) -> Result<()> {
        self.request(|respond_to| PlayerCommand::SelectVideoTrack {
            selector,
            respond_to,
        })
        .await
    }

    pub async fn player_view(&self) -> Result<Option<RenderSurface>> {
        self.request(|respond_to| PlayerCommand::PlayerView { respond_to })
            .await
    }

    pub async fn start_pip(&self) -> Result<()> {
        self.request(|respond_to| PlayerCommand::StartPip { respond_to })
            .await
    }

    pub async fn stop_pip(&self) -> Result<()> {
        self.request(|respond_to| PlayerCommand::StopPip { respond_to })
            .await
    }

    /// Frame near `seconds`, or None when none arrived within the configured timeout
    pub async fn generate_thumbnail(&self, seconds: f64) -> Result<Option<Thumbnail>> {
        let completion = self
            .request(|respond_to| PlayerCommand::GenerateThumbnail {
                seconds,
                respond_to,
            })
            .await?;
        match tokio::time::timeout(self.thumbnail_timeout, completion).await {
            Ok(thumbnail) => Ok(thumbnail.unwrap_or(None)),
            Err(_) => {
                warn!("Thumbnail at {:.1}s timed out", seconds);
                Ok(None)
            }
        }
    }

    pub async fn handle_pinch(&self, scale: f64) -> Result<()> {
        self.request(|respond_to| PlayerCommand::HandlePinch { scale, respond_to })
            .await
    }

    pub async fn streaming_info(&self) -> Result<StreamingInfo> {
        self.request(|respond_to| PlayerCommand::GetStreamingInfo { respond_to })
            .await
    }

    pub async fn backend(&self) -> Result<Option<PlayerBackend>> {
        self.request(|respond_to| PlayerCommand::GetBackend { respond_to })
            .await
    }

    /// Tear the active adapter down and continue the current item on `backend`
    pub async fn switch_backend(&self, backend: PlayerBackend) -> Result<()> {
        self.request(|respond_to| PlayerCommand::SwitchBackend {
            backend,
            respond_to,
        })
        .await??;
        Ok(())
    }
}
