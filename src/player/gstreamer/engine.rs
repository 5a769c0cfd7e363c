//! Engine-native surface of the GStreamer backend.
//!
//! The adapter only ever talks to a [`GstEngine`]. The real implementation
//! drives a `playbin` pipeline; tests drive a scripted fake.

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::player::events::{Listener, SubscriptionId};
use crate::player::thumbnail::ThumbnailSource;
use crate::player::types::{RenderSurface, TrackKind, ZoomMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControlStatus {
    Paused,
    /// Playback was requested but the pipeline is waiting for data
    WaitingToPlay,
    Playing,
}

/// Notifications a [`GstEngine`] delivers to its subscribers, on engine threads.
#[derive(Debug, Clone, PartialEq)]
pub enum GstEvent {
    /// The current item prerolled and its streams are known
    ItemReady,
    ItemFailed(String),
    /// Periodic position report, seconds
    TimeChanged(f64),
    DurationChanged(f64),
    StatusChanged(TimeControlStatus),
    RateChanged(f64),
    /// End of the buffered range, seconds
    LoadedRangeChanged(f64),
    PlaybackEnded,
    PipStarted,
    PipStopped,
}

/// Groups of alternative renditions inside one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCharacteristic {
    Audible,
    Legible,
}

impl MediaCharacteristic {
    pub fn track_kind(self) -> TrackKind {
        match self {
            MediaCharacteristic::Audible => TrackKind::Audio,
            MediaCharacteristic::Legible => TrackKind::Subtitle,
        }
    }
}

/// One selectable rendition of a media selection group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaOption {
    pub display_name: String,
    /// BCP 47 tag such as `en-US`
    pub extended_language_tag: Option<String>,
    pub locale_identifier: Option<String>,
    /// ISO 639 code of the locale
    pub language_code: Option<String>,
}

/// One entry of the item's network access log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessLogEvent {
    pub indicated_bitrate: Option<f64>,
    pub observed_bitrate: Option<f64>,
    pub server_address: Option<String>,
}

/// Called once with whether the seek finished (false when interrupted).
pub type SeekCallback = Box<dyn FnOnce(bool) + Send + 'static>;

pub trait GstEngine: Send + Sync {
    fn subscribe(&self, listener: Listener<GstEvent>) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);

    /// Replace the current item. Ready or failed is reported through events.
    fn replace_item(&self, url: &Url);
    fn has_item(&self) -> bool;

    fn play(&self);
    fn pause(&self);
    fn rate(&self) -> f64;
    fn set_rate(&self, rate: f64);
    fn time_control_status(&self) -> TimeControlStatus;

    fn current_time(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn loaded_time_range(&self) -> Option<Duration>;
    /// Exact seek. `done` must not be invoked before this call returns.
    fn seek(&self, to: Duration, done: SeekCallback);

    fn media_selection_group(&self, characteristic: MediaCharacteristic)
    -> Option<Vec<MediaOption>>;
    fn selected_media_option(&self, characteristic: MediaCharacteristic) -> Option<usize>;
    /// `None` deselects every option of the group
    fn select_media_option(&self, characteristic: MediaCharacteristic, index: Option<usize>);

    fn create_surface(&self) -> RenderSurface;
    fn set_video_gravity(&self, mode: ZoomMode);

    fn pip_supported(&self) -> bool;
    fn start_pip(&self);
    fn stop_pip(&self);

    fn access_log(&self) -> Vec<AccessLogEvent>;
    fn presentation_size(&self) -> Option<(u32, u32)>;
    fn codec(&self, kind: TrackKind) -> Option<String>;
    fn channel_layout(&self) -> Option<String>;

    /// Frame grabber for the current item, None without one.
    fn thumbnail_source(&self) -> Option<Arc<dyn ThumbnailSource>>;
}
