//! Engine-native surface of the MPV backend.
//!
//! Tracks are addressed by list position, the clock runs in milliseconds and
//! seeking takes a fraction of the media length.

use std::sync::Arc;
use url::Url;

use crate::player::events::{Listener, SubscriptionId};
use crate::player::thumbnail::ThumbnailSource;
use crate::player::types::{RenderSurface, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpvState {
    Idle,
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MpvEvent {
    StateChanged(MpvState),
    /// Playback clock, milliseconds
    TimeChanged(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MpvTrack {
    /// Engine track id, absent for tracks the engine did not number
    pub id: Option<i64>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub selected: bool,
}

impl MpvTrack {
    /// Display name in the form the engine's own track menus use.
    pub fn display_name(&self, kind: TrackKind, position: usize) -> String {
        let number = self.id.unwrap_or(position as i64 + 1);
        let label = match kind {
            TrackKind::Audio => "Audio Track",
            TrackKind::Subtitle => "Subtitle",
            TrackKind::Video => "Video Track",
        };
        match (&self.title, &self.language) {
            (Some(title), _) => title.clone(),
            (None, Some(lang)) => format!("{} {} ({})", label, number, lang),
            (None, None) => format!("{} {}", label, number),
        }
    }
}

/// Snapshot of the engine's technical properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MpvStats {
    pub stream_host: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Bits per second
    pub video_bitrate: Option<f64>,
    pub audio_bitrate: Option<f64>,
    /// Seconds of demuxed data ahead of the playhead
    pub cache_duration: Option<f64>,
    pub channels: Option<String>,
    pub samplerate: Option<u32>,
}

pub trait MpvEngine: Send + Sync {
    fn subscribe(&self, listener: Listener<MpvEvent>) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);

    /// Replace the media. `options` are `key=value` per-file options.
    fn set_media(&self, url: &Url, options: &[String]);
    fn has_media(&self) -> bool;

    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn is_playing(&self) -> bool;
    fn state(&self) -> MpvState;
    fn rate(&self) -> f32;
    fn set_rate(&self, rate: f32);

    fn time_ms(&self) -> i64;
    /// Media length, 0 while unknown
    fn length_ms(&self) -> i64;
    /// Playhead as a fraction of the media length
    fn position(&self) -> f64;
    fn set_position(&self, fraction: f64);

    fn tracks(&self, kind: TrackKind) -> Vec<MpvTrack>;
    fn select_track(&self, kind: TrackKind, index: usize);
    fn disable_track(&self, kind: TrackKind);

    fn create_surface(&self) -> RenderSurface;
    fn set_drawable(&self, surface: RenderSurface);
    fn has_drawable(&self) -> bool;
    /// `W:H`, or the empty string for the engine default
    fn set_aspect_ratio(&self, ratio: &str);

    fn stats(&self) -> MpvStats;
    fn thumbnail_source(&self) -> Option<Arc<dyn ThumbnailSource>>;
}
