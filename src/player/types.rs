/// Common types used by player backends
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerBackend {
    #[default]
    GStreamer,
    Mpv,
}

impl PlayerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerBackend::GStreamer => "gstreamer",
            PlayerBackend::Mpv => "mpv",
        }
    }
}

impl From<&str> for PlayerBackend {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "mpv" => PlayerBackend::Mpv,
            _ => PlayerBackend::GStreamer, // Default to GStreamer
        }
    }
}

impl fmt::Display for PlayerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerBackend::GStreamer => write!(f, "GStreamer"),
            PlayerBackend::Mpv => write!(f, "MPV"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Subtitle,
    Video,
}

/// Normalized description of one selectable track of the loaded media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub language_code: Option<String>,
    pub kind: TrackKind,
}

impl TrackInfo {
    pub fn new(
        kind: TrackKind,
        id: impl Into<String>,
        name: impl Into<String>,
        language_code: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            language_code,
            kind,
        }
    }
}

/// Addresses a track either by its descriptor id or by its position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelector {
    Id(String),
    Index(usize),
}

impl From<&str> for TrackSelector {
    fn from(id: &str) -> Self {
        TrackSelector::Id(id.to_string())
    }
}

impl From<usize> for TrackSelector {
    fn from(index: usize) -> Self {
        TrackSelector::Index(index)
    }
}

impl TrackSelector {
    /// Position of the selected track inside `tracks`, if any.
    pub fn resolve(&self, tracks: &[TrackInfo]) -> Option<usize> {
        match self {
            TrackSelector::Id(id) => tracks.iter().position(|t| &t.id == id),
            TrackSelector::Index(index) => (*index < tracks.len()).then_some(*index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZoomMode {
    #[default]
    Fit, // Fit entire video in the surface (may show black bars)
    Fill, // Fill the surface (may crop video)
}

impl fmt::Display for ZoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoomMode::Fit => write!(f, "Fit"),
            ZoomMode::Fill => write!(f, "Fill"),
        }
    }
}

/// Best-effort technical snapshot of the current playback.
///
/// `None` marks a value the engine could not report; nothing here is made up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingInfo {
    pub server: Option<String>,
    /// Indicated bitrates of the variants seen so far, bits per second
    pub bitrates: Vec<f64>,
    /// Measured transfer rate, bits per second
    pub observed_bitrate: Option<f64>,
    /// Seconds of media buffered ahead of the start of the item
    pub buffer_duration: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub resolution: Option<(u32, u32)>,
    pub video_bitrate: Option<f64>,
    pub track_name: Option<String>,
    pub channels: Option<String>,
}

impl StreamingInfo {
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::default()
    }
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to the surface a backend renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderSurface {
    pub id: u64,
    pub backend: PlayerBackend,
}

impl RenderSurface {
    pub fn allocate(backend: PlayerBackend) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            backend,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    /// Media time the frame was taken at, in seconds
    pub time: f64,
    pub image: RgbaImage,
}

/// Resolves to true once the engine finished the seek, false when it failed
/// or a newer seek replaced it.
pub type SeekCompletion = oneshot::Receiver<bool>;

/// Resolves to the thumbnail, or None when no frame could be produced.
pub type ThumbnailCompletion = oneshot::Receiver<Option<Thumbnail>>;

/// Clamp a requested seek target into `[0, duration]`.
///
/// A non-positive duration means the length is not known yet, in which case
/// only the lower bound applies. NaN goes to the start, and so does an
/// infinite target when there is no end to clamp it to.
pub fn clamp_seek_target(target: f64, duration: f64) -> f64 {
    if target.is_nan() {
        return 0.0;
    }
    let target = target.max(0.0);
    if duration.is_finite() && duration > 0.0 {
        target.min(duration)
    } else if target.is_finite() {
        target
    } else {
        0.0
    }
}

/// Seek target as a nanosecond position, or None when it does not fit below
/// `u64::MAX` nanoseconds (the value engines reserve for "no time").
pub fn seek_position(seconds: f64) -> Option<Duration> {
    let position = Duration::try_from_secs_f64(seconds).ok()?;
    u64::try_from(position.as_nanos())
        .ok()
        .filter(|nanos| *nanos != u64::MAX)
        .map(|_| position)
}
