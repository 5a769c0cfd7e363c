use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace};

use super::dispatch::UiContext;
use super::types::{PlayerBackend, TrackInfo};
use crate::core::viewmodels::Property;

/// Point-in-time copy of everything the manager exposes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub current_time: f64,
    pub duration: f64,
    pub buffered_duration: f64,
    pub is_buffering: bool,
    pub is_playing: bool,
    pub is_pip_active: bool,
    pub is_seeking: bool,
    pub seek_time: f64,
    pub is_media_ready: bool,
    pub did_end: bool,
    pub playback_speed: f32,
    pub selected_backend: PlayerBackend,
    pub audio_tracks: Vec<TrackInfo>,
    pub subtitle_tracks: Vec<TrackInfo>,
    pub video_tracks: Vec<TrackInfo>,
    pub selected_audio_track: Option<TrackInfo>,
    pub selected_subtitle_track: Option<TrackInfo>,
}

/// Process-wide playback state shared by the active backend and the UI.
///
/// The UI reads through the property accessors. Writes come from the active
/// adapter's event handlers via [`ManagerSink`] and from user actions relayed
/// by the controller.
#[derive(Debug)]
pub struct PlayerManager {
    current_time: Property<f64>,
    duration: Property<f64>,
    buffered_duration: Property<f64>,
    is_buffering: Property<bool>,
    is_playing: Property<bool>,
    is_pip_active: Property<bool>,
    is_seeking: Property<bool>,
    seek_time: Property<f64>,
    is_media_ready: Property<bool>,
    did_end: Property<bool>,
    playback_speed: Property<f32>,
    selected_backend: Property<PlayerBackend>,
    audio_tracks: Property<Vec<TrackInfo>>,
    subtitle_tracks: Property<Vec<TrackInfo>>,
    video_tracks: Property<Vec<TrackInfo>>,
    selected_audio_track: Property<Option<TrackInfo>>,
    selected_subtitle_track: Property<Option<TrackInfo>>,
    // Bumped on every backend activation; writes tagged with an older value are dropped.
    // Held across the reset and across each tagged write so the two never interleave.
    epoch: Mutex<u64>,
}

impl Default for PlayerManager {
    fn default() -> Self {
        Self::new(PlayerBackend::default())
    }
}

impl PlayerManager {
    pub fn new(backend: PlayerBackend) -> Self {
        Self {
            current_time: Property::new(0.0, "current_time"),
            duration: Property::new(0.0, "duration"),
            buffered_duration: Property::new(0.0, "buffered_duration"),
            is_buffering: Property::new(false, "is_buffering"),
            is_playing: Property::new(false, "is_playing"),
            is_pip_active: Property::new(false, "is_pip_active"),
            is_seeking: Property::new(false, "is_seeking"),
            seek_time: Property::new(0.0, "seek_time"),
            is_media_ready: Property::new(false, "is_media_ready"),
            did_end: Property::new(false, "did_end"),
            playback_speed: Property::new(1.0, "playback_speed"),
            selected_backend: Property::new(backend, "selected_backend"),
            audio_tracks: Property::new(Vec::new(), "audio_tracks"),
            subtitle_tracks: Property::new(Vec::new(), "subtitle_tracks"),
            video_tracks: Property::new(Vec::new(), "video_tracks"),
            selected_audio_track: Property::new(None, "selected_audio_track"),
            selected_subtitle_track: Property::new(None, "selected_subtitle_track"),
            epoch: Mutex::new(0),
        }
    }

    /// Make `backend` the active one and return the epoch its writes must carry.
    pub(crate) fn activate_backend(&self, backend: PlayerBackend) -> u64 {
        let mut current = self.epoch.lock().unwrap();
        *current += 1;
        let epoch = *current;
        self.reset_playback_state();
        self.selected_backend.set(backend);
        drop(current);
        info!("Activated {} backend (epoch {})", backend, epoch);
        epoch
    }

    pub fn current_epoch(&self) -> u64 {
        *self.epoch.lock().unwrap()
    }

    /// Run `write` only while `epoch` is still the active one.
    fn write_in_epoch<F>(&self, epoch: u64, write: F) -> bool
    where
        F: FnOnce(&PlayerManager),
    {
        let current = self.epoch.lock().unwrap();
        if *current != epoch {
            return false;
        }
        write(self);
        drop(current);
        true
    }

    fn reset_playback_state(&self) {
        self.reset_for_new_item();
        self.is_playing.set(false);
        self.is_pip_active.set(false);
        self.playback_speed.set(1.0);
    }

    /// Forget everything tied to the previous media item.
    pub(crate) fn reset_for_new_item(&self) {
        debug!("Resetting playback state for new item");
        self.current_time.set(0.0);
        self.duration.set(0.0);
        self.buffered_duration.set(0.0);
        self.is_buffering.set(false);
        self.is_seeking.set(false);
        self.seek_time.set(0.0);
        self.is_media_ready.set(false);
        self.did_end.set(false);
        self.audio_tracks.set(Vec::new());
        self.subtitle_tracks.set(Vec::new());
        self.video_tracks.set(Vec::new());
        self.selected_audio_track.set(None);
        self.selected_subtitle_track.set(None);
    }

    pub(crate) fn set_current_time(&self, seconds: f64) {
        self.current_time.set(seconds);
    }

    pub(crate) fn set_duration(&self, seconds: f64) {
        self.duration.set(seconds);
    }

    pub(crate) fn set_buffered_duration(&self, seconds: f64) {
        self.buffered_duration.set(seconds);
    }

    pub(crate) fn set_buffering(&self, buffering: bool) {
        self.is_buffering.set(buffering);
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        if self.is_playing.set(playing) && playing {
            self.did_end.set(false);
        }
    }

    pub(crate) fn set_pip_active(&self, active: bool) {
        self.is_pip_active.set(active);
    }

    pub(crate) fn begin_seek(&self, target: f64) {
        self.seek_time.set(target);
        self.is_seeking.set(true);
    }

    pub(crate) fn end_seek(&self) {
        self.is_seeking.set(false);
    }

    pub(crate) fn set_media_ready(&self, ready: bool) {
        self.is_media_ready.set(ready);
    }

    pub(crate) fn video_did_end(&self) {
        info!("Playback reached the end of the item");
        self.is_playing.set(false);
        self.did_end.set(true);
    }

    pub(crate) fn set_playback_speed(&self, speed: f32) {
        self.playback_speed.set(speed);
    }

    pub(crate) fn update_track_info(
        &self,
        audio: Vec<TrackInfo>,
        subtitles: Vec<TrackInfo>,
        video: Vec<TrackInfo>,
    ) {
        trace!(
            "Track info: {} audio, {} subtitle, {} video",
            audio.len(),
            subtitles.len(),
            video.len()
        );
        self.audio_tracks.set(audio);
        self.subtitle_tracks.set(subtitles);
        self.video_tracks.set(video);
    }

    pub(crate) fn set_selected_tracks(
        &self,
        audio: Option<TrackInfo>,
        subtitle: Option<TrackInfo>,
    ) {
        self.selected_audio_track.set(audio);
        self.selected_subtitle_track.set(subtitle);
    }

    pub fn current_time(&self) -> &Property<f64> {
        &self.current_time
    }

    pub fn duration(&self) -> &Property<f64> {
        &self.duration
    }

    pub fn buffered_duration(&self) -> &Property<f64> {
        &self.buffered_duration
    }

    pub fn is_buffering(&self) -> &Property<bool> {
        &self.is_buffering
    }

    pub fn is_playing(&self) -> &Property<bool> {
        &self.is_playing
    }

    pub fn is_pip_active(&self) -> &Property<bool> {
        &self.is_pip_active
    }

    pub fn is_seeking(&self) -> &Property<bool> {
        &self.is_seeking
    }

    pub fn seek_time(&self) -> &Property<f64> {
        &self.seek_time
    }

    pub fn is_media_ready(&self) -> &Property<bool> {
        &self.is_media_ready
    }

    pub fn did_end(&self) -> &Property<bool> {
        &self.did_end
    }

    pub fn playback_speed(&self) -> &Property<f32> {
        &self.playback_speed
    }

    pub fn selected_backend(&self) -> &Property<PlayerBackend> {
        &self.selected_backend
    }

    pub fn audio_tracks(&self) -> &Property<Vec<TrackInfo>> {
        &self.audio_tracks
    }

    pub fn subtitle_tracks(&self) -> &Property<Vec<TrackInfo>> {
        &self.subtitle_tracks
    }

    pub fn video_tracks(&self) -> &Property<Vec<TrackInfo>> {
        &self.video_tracks
    }

    pub fn selected_audio_track(&self) -> &Property<Option<TrackInfo>> {
        &self.selected_audio_track
    }

    pub fn selected_subtitle_track(&self) -> &Property<Option<TrackInfo>> {
        &self.selected_subtitle_track
    }

    pub fn snapshot(&self) -> PlaybackState {
        PlaybackState {
            current_time: self.current_time.get(),
            duration: self.duration.get(),
            buffered_duration: self.buffered_duration.get(),
            is_buffering: self.is_buffering.get(),
            is_playing: self.is_playing.get(),
            is_pip_active: self.is_pip_active.get(),
            is_seeking: self.is_seeking.get(),
            seek_time: self.seek_time.get(),
            is_media_ready: self.is_media_ready.get(),
            did_end: self.did_end.get(),
            playback_speed: self.playback_speed.get(),
            selected_backend: self.selected_backend.get(),
            audio_tracks: self.audio_tracks.get(),
            subtitle_tracks: self.subtitle_tracks.get(),
            video_tracks: self.video_tracks.get(),
            selected_audio_track: self.selected_audio_track.get(),
            selected_subtitle_track: self.selected_subtitle_track.get(),
        }
    }
}

/// Write path from one adapter into the manager.
///
/// Every write is re-dispatched onto the UI context and dropped there if the
/// adapter that produced it is no longer the active one.
#[derive(Clone, Debug)]
pub struct ManagerSink {
    manager: Arc<PlayerManager>,
    ui: UiContext,
    epoch: u64,
}

impl ManagerSink {
    pub fn new(manager: Arc<PlayerManager>, ui: UiContext, epoch: u64) -> Self {
        Self { manager, ui, epoch }
    }

    pub fn apply<F>(&self, write: F)
    where
        F: FnOnce(&PlayerManager) + Send + 'static,
    {
        let manager = self.manager.clone();
        let epoch = self.epoch;
        self.ui.dispatch(move || {
            if !manager.write_in_epoch(epoch, write) {
                trace!("Dropping state write from inactive backend (epoch {})", epoch);
            }
        });
    }

    pub fn manager(&self) -> &Arc<PlayerManager> {
        &self.manager
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
