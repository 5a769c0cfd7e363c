pub mod controller;
pub mod dispatch;
pub mod events;
pub mod factory;
pub mod gstreamer;
pub mod gstreamer_player;
pub mod inflight;
pub mod manager;
pub mod mpv;
pub mod mpv_player;
pub mod thumbnail;
pub mod traits;
pub mod types;

pub use controller::{PlaybackTimes, PlayerController, PlayerHandle, TrackListing};
pub use dispatch::{UiContext, UiLoop, ui_channel};
pub use factory::{DefaultEngineFactory, EngineFactory, Player};
pub use gstreamer_player::GStreamerPlayer;
pub use manager::{ManagerSink, PlaybackState, PlayerManager};
pub use mpv_player::MpvPlayer;
pub use traits::MediaPlayer;
pub use types::{
    PlayerBackend, RenderSurface, StreamingInfo, Thumbnail, TrackInfo, TrackKind, TrackSelector,
    ZoomMode,
};
