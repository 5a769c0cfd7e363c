//! Toolkit-independent models of the player's bottom bar.
//!
//! Each control reads the [`PlayerManager`] and turns user input into
//! [`PlayerHandle`] calls. A toolkit binding renders what these return.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::player::{PlayerBackend, PlayerHandle, PlayerManager, StreamingInfo};

pub const PLAYBACK_SPEEDS: [f32; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

const UNKNOWN: &str = "Unknown";

/// `m:ss` below one hour, `h:mm:ss` from there on.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total_secs = seconds as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Elapsed and total time. While a seek is in flight the target is shown
/// instead of the playhead so the label does not jump back.
pub struct PlaybackTimeLabel {
    manager: Arc<PlayerManager>,
}

impl PlaybackTimeLabel {
    pub fn new(manager: Arc<PlayerManager>) -> Self {
        Self { manager }
    }

    pub fn elapsed(&self) -> String {
        let seconds = if self.manager.is_seeking().get() {
            self.manager.seek_time().get()
        } else {
            self.manager.current_time().get()
        };
        format_time(seconds)
    }

    pub fn total(&self) -> String {
        format_time(self.manager.duration().get())
    }

    pub fn text(&self) -> String {
        format!("{} • {}", self.elapsed(), self.total())
    }
}

pub struct PipButton {
    manager: Arc<PlayerManager>,
    handle: PlayerHandle,
}

impl PipButton {
    pub fn new(manager: Arc<PlayerManager>, handle: PlayerHandle) -> Self {
        Self { manager, handle }
    }

    pub fn icon(&self) -> &'static str {
        if self.manager.is_pip_active().get() {
            "pip.fill"
        } else {
            "pip"
        }
    }

    pub async fn press(&self) -> Result<()> {
        if self.manager.is_pip_active().get() {
            debug!("PiP button: stopping");
            self.handle.stop_pip().await
        } else {
            debug!("PiP button: starting");
            self.handle.start_pip().await
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedEntry {
    pub speed: f32,
    pub label: String,
    pub selected: bool,
}

pub struct SpeedMenu {
    manager: Arc<PlayerManager>,
}

impl SpeedMenu {
    pub fn new(manager: Arc<PlayerManager>) -> Self {
        Self { manager }
    }

    pub fn entries(&self) -> Vec<SpeedEntry> {
        let current = self.manager.playback_speed().get();
        PLAYBACK_SPEEDS
            .iter()
            .map(|&speed| SpeedEntry {
                speed,
                label: format!("{}x", speed),
                selected: (speed - current).abs() < f32::EPSILON,
            })
            .collect()
    }

    pub async fn select(&self, handle: &PlayerHandle, speed: f32) -> Result<()> {
        handle.set_playback_speed(speed).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSlot {
    TrackMenu,
    Pip,
    Seekbar,
}

pub struct BottomControls {
    manager: Arc<PlayerManager>,
}

impl BottomControls {
    pub fn new(manager: Arc<PlayerManager>) -> Self {
        Self { manager }
    }

    /// Only the GStreamer backend can hand its surface to a PiP window.
    pub fn shows_pip(&self) -> bool {
        self.manager.selected_backend().get() == PlayerBackend::GStreamer
    }

    pub fn slots(&self) -> Vec<ControlSlot> {
        let mut slots = vec![ControlSlot::TrackMenu];
        if self.shows_pip() {
            slots.push(ControlSlot::Pip);
        }
        slots.push(ControlSlot::Seekbar);
        slots
    }
}

/// Label/value rows for the streaming statistics overlay.
pub fn streaming_info_rows(info: &StreamingInfo) -> Vec<(&'static str, String)> {
    fn or_unknown(value: Option<String>) -> String {
        value.unwrap_or_else(|| UNKNOWN.to_string())
    }
    fn kbps(bits: f64) -> String {
        format!("{:.0} kbps", bits / 1000.0)
    }

    let bitrates = if info.bitrates.is_empty() {
        UNKNOWN.to_string()
    } else {
        info.bitrates
            .iter()
            .map(|b| kbps(*b))
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        ("Server", or_unknown(info.server.clone())),
        ("Bitrates", bitrates),
        ("Observed bitrate", or_unknown(info.observed_bitrate.map(kbps))),
        (
            "Buffer",
            or_unknown(info.buffer_duration.map(|s| format!("{:.1} s", s))),
        ),
        ("Video codec", or_unknown(info.video_codec.clone())),
        ("Audio codec", or_unknown(info.audio_codec.clone())),
        (
            "Resolution",
            or_unknown(info.resolution.map(|(w, h)| format!("{}x{}", w, h))),
        ),
        ("Video bitrate", or_unknown(info.video_bitrate.map(kbps))),
        ("Track", or_unknown(info.track_name.clone())),
        ("Channels", or_unknown(info.channels.clone())),
    ]
}
