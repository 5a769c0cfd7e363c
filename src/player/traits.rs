//! Capability contract every player backend satisfies.
//!
//! Each trait is independently implementable. Backends that cannot provide a
//! capability keep the call harmless: they return an empty or neutral value
//! and log a warning instead of failing.

use async_trait::async_trait;
use url::Url;

use super::types::{
    PlayerBackend, RenderSurface, SeekCompletion, StreamingInfo, ThumbnailCompletion, TrackInfo,
    TrackSelector,
};

pub trait PlaybackControl {
    fn is_playing(&self) -> bool;
    fn playback_speed(&self) -> f32;
    fn set_playback_speed(&self, speed: f32);
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
}

pub trait TimeControl {
    /// Seconds from the start of the item
    fn current_time(&self) -> f64;
    /// Seconds, 0 while unknown
    fn duration(&self) -> f64;
    fn buffered_duration(&self) -> f64;
    fn is_buffering(&self) -> bool;
    fn seek(&self, seconds: f64) -> SeekCompletion;
}

pub trait TrackSelection {
    fn audio_tracks(&self) -> Vec<TrackInfo>;
    fn subtitle_tracks(&self) -> Vec<TrackInfo>;
    fn video_tracks(&self) -> Vec<TrackInfo> {
        Vec::new()
    }
    fn current_audio_track(&self) -> Option<TrackInfo>;
    fn current_subtitle_track(&self) -> Option<TrackInfo>;
    fn select_audio_track(&self, selector: &TrackSelector);
    /// `None` turns subtitles off
    fn select_subtitle_track(&self, selector: Option<&TrackSelector>);
    fn select_video_track(&self, _selector: &TrackSelector) {}
}

#[async_trait]
pub trait MediaLoading {
    async fn load(&self, url: &Url, resume_position: Option<f64>);
}

pub trait ViewRendering {
    /// The surface is created on first use and reused afterwards.
    fn player_view(&self) -> RenderSurface;
    fn setup_pip(&self);
    fn start_pip(&self);
    fn stop_pip(&self);
}

pub trait ThumbnailGeneration {
    fn generate_thumbnail(&self, seconds: f64) -> ThumbnailCompletion;
}

pub trait GestureHandling {
    fn handle_pinch(&self, scale: f64);
}

pub trait StreamingInfoReporting {
    fn streaming_info(&self) -> StreamingInfo;
}

/// Everything a backend adapter offers to the rest of the application.
pub trait MediaPlayer:
    PlaybackControl
    + TimeControl
    + TrackSelection
    + MediaLoading
    + ViewRendering
    + ThumbnailGeneration
    + GestureHandling
    + StreamingInfoReporting
    + Send
    + Sync
{
    fn backend(&self) -> PlayerBackend;

    /// Detach from every engine notification. Safe to call more than once.
    fn teardown(&self);
}
