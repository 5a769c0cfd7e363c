use std::sync::Arc;
use tracing::info;
use url::Url;

use super::gstreamer::engine::GstEngine;
use super::manager::ManagerSink;
use super::mpv::engine::MpvEngine;
use super::traits::{MediaLoading, MediaPlayer};
use super::types::PlayerBackend;
use super::{GStreamerPlayer, MpvPlayer};
use crate::config::Config;
use crate::utils::errors::PlayerError;

/// Creates the engine instance behind a new adapter.
pub trait EngineFactory: Send + Sync {
    fn gstreamer(&self, config: &Config) -> Result<Arc<dyn GstEngine>, PlayerError>;
    fn mpv(&self, config: &Config) -> Result<Arc<dyn MpvEngine>, PlayerError>;
}

/// Builds the real engines that were compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEngineFactory;

impl EngineFactory for DefaultEngineFactory {
    #[cfg(feature = "gstreamer")]
    fn gstreamer(&self, config: &Config) -> Result<Arc<dyn GstEngine>, PlayerError> {
        let engine = super::gstreamer::playbin::PlaybinEngine::new(config)?;
        Ok(engine)
    }

    #[cfg(not(feature = "gstreamer"))]
    fn gstreamer(&self, _config: &Config) -> Result<Arc<dyn GstEngine>, PlayerError> {
        Err(PlayerError::BackendUnavailable(PlayerBackend::GStreamer))
    }

    #[cfg(feature = "mpv")]
    fn mpv(&self, config: &Config) -> Result<Arc<dyn MpvEngine>, PlayerError> {
        let engine = super::mpv::libmpv::LibMpvEngine::new(config)?;
        Ok(engine)
    }

    #[cfg(not(feature = "mpv"))]
    fn mpv(&self, _config: &Config) -> Result<Arc<dyn MpvEngine>, PlayerError> {
        Err(PlayerError::BackendUnavailable(PlayerBackend::Mpv))
    }
}

/// The active adapter, chosen at runtime.
pub enum Player {
    GStreamer(GStreamerPlayer),
    Mpv(MpvPlayer),
}

impl Player {
    pub fn new(
        backend: PlayerBackend,
        config: &Config,
        engines: &dyn EngineFactory,
        sink: ManagerSink,
    ) -> Result<Self, PlayerError> {
        match backend {
            PlayerBackend::GStreamer => {
                info!("Creating GStreamer player backend");
                let engine = engines.gstreamer(config)?;
                Ok(Player::GStreamer(GStreamerPlayer::new(engine, sink, config)))
            }
            PlayerBackend::Mpv => {
                info!("Creating MPV player backend");
                let engine = engines.mpv(config)?;
                Ok(Player::Mpv(MpvPlayer::new(engine, sink, config)))
            }
        }
    }

    pub fn backend(&self) -> PlayerBackend {
        match self {
            Player::GStreamer(_) => PlayerBackend::GStreamer,
            Player::Mpv(_) => PlayerBackend::Mpv,
        }
    }

    pub fn as_media_player(&self) -> &dyn MediaPlayer {
        match self {
            Player::GStreamer(p) => p,
            Player::Mpv(p) => p,
        }
    }

    pub async fn load(&self, url: &Url, resume_position: Option<f64>) {
        match self {
            Player::GStreamer(p) => p.load(url, resume_position).await,
            Player::Mpv(p) => p.load(url, resume_position).await,
        }
    }

    pub fn teardown(&self) {
        match self {
            Player::GStreamer(p) => p.teardown(),
            Player::Mpv(p) => p.teardown(),
        }
    }
}
