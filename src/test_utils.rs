#![cfg(test)]

//! Scripted engines and wiring helpers shared by the unit tests.

use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::player::dispatch::{UiLoop, ui_channel};
use crate::player::events::{Listener, Listeners, SubscriptionId};
use crate::player::factory::EngineFactory;
use crate::player::gstreamer::engine::{
    AccessLogEvent, GstEngine, GstEvent, MediaCharacteristic, MediaOption, SeekCallback,
    TimeControlStatus,
};
use crate::player::manager::{ManagerSink, PlayerManager};
use crate::player::mpv::engine::{MpvEngine, MpvEvent, MpvState, MpvStats, MpvTrack};
use crate::player::thumbnail::{FrameCallback, ThumbnailSource};
use crate::player::types::{PlayerBackend, RenderSurface, TrackKind, ZoomMode};
use crate::utils::errors::PlayerError;

/// Manager with `backend` activated, a sink carrying the live epoch, and the
/// UI loop tests drain with `run_pending`.
pub fn active_sink(backend: PlayerBackend) -> (Arc<PlayerManager>, ManagerSink, UiLoop) {
    let manager = Arc::new(PlayerManager::new(backend));
    let (ui, ui_loop) = ui_channel();
    let epoch = manager.activate_backend(backend);
    let sink = ManagerSink::new(manager.clone(), ui, epoch);
    (manager, sink, ui_loop)
}

/// Frame source that answers right away or holds requests until released.
pub struct FakeThumbnailSource {
    width: u32,
    height: u32,
    deferred: bool,
    pending: Mutex<Vec<FrameCallback>>,
}

impl FakeThumbnailSource {
    pub fn immediate(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            deferred: false,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn deferred(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            deferred: true,
            pending: Mutex::new(Vec::new()),
        })
    }

    fn frame(&self) -> RgbaImage {
        RgbaImage::from_pixel(self.width, self.height, Rgba([16, 32, 64, 255]))
    }

    pub fn release_all(&self) {
        let pending: Vec<FrameCallback> = self.pending.lock().unwrap().drain(..).collect();
        for done in pending {
            done(Some(self.frame()));
        }
    }
}

impl ThumbnailSource for FakeThumbnailSource {
    fn grab(&self, _seconds: f64, done: FrameCallback) {
        if self.deferred {
            self.pending.lock().unwrap().push(done);
        } else {
            done(Some(self.frame()));
        }
    }
}

#[derive(Default)]
struct GstScript {
    item: Option<Url>,
    // Rate changes need a position, which only exists once the item prerolled
    prerolled: bool,
    rate: f64,
    status: Option<TimeControlStatus>,
    current: Option<Duration>,
    duration: Option<Duration>,
    loaded: Option<Duration>,
    options: HashMap<MediaCharacteristic, Vec<MediaOption>>,
    selected: HashMap<MediaCharacteristic, usize>,
    pending_seeks: Vec<(Duration, SeekCallback)>,
    seek_log: Vec<Duration>,
    play_count: usize,
    surfaces: usize,
    gravity: Option<ZoomMode>,
    pip_supported: bool,
    pip_starts: usize,
    access_log: Vec<AccessLogEvent>,
    presentation_size: Option<(u32, u32)>,
    codecs: HashMap<TrackKind, String>,
    thumbnails: Option<Arc<FakeThumbnailSource>>,
}

/// In-memory stand-in for a playbin pipeline.
#[derive(Default)]
pub struct FakeGstEngine {
    listeners: Listeners<GstEvent>,
    script: Mutex<GstScript>,
}

impl FakeGstEngine {
    pub fn new() -> Arc<Self> {
        let engine = Self::default();
        engine.script.lock().unwrap().rate = 1.0;
        Arc::new(engine)
    }

    pub fn emit(&self, event: GstEvent) {
        if matches!(event, GstEvent::ItemReady) {
            self.script.lock().unwrap().prerolled = true;
        }
        self.listeners.emit(&event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_duration(&self, seconds: f64) {
        self.script.lock().unwrap().duration = Some(Duration::from_secs_f64(seconds));
    }

    pub fn set_media_options(&self, characteristic: MediaCharacteristic, options: Vec<MediaOption>) {
        self.script
            .lock()
            .unwrap()
            .options
            .insert(characteristic, options);
    }

    /// Finish every outstanding seek, oldest first.
    pub fn complete_seeks(&self, finished: bool) {
        let pending: Vec<(Duration, SeekCallback)> =
            self.script.lock().unwrap().pending_seeks.drain(..).collect();
        for (target, done) in pending {
            if finished {
                self.script.lock().unwrap().current = Some(target);
            }
            done(finished);
        }
    }

    pub fn seek_requests(&self) -> Vec<Duration> {
        self.script.lock().unwrap().seek_log.clone()
    }

    pub fn play_count(&self) -> usize {
        self.script.lock().unwrap().play_count
    }

    pub fn surfaces_created(&self) -> usize {
        self.script.lock().unwrap().surfaces
    }

    pub fn gravity(&self) -> Option<ZoomMode> {
        self.script.lock().unwrap().gravity
    }

    pub fn set_pip_supported(&self, supported: bool) {
        self.script.lock().unwrap().pip_supported = supported;
    }

    pub fn pip_starts(&self) -> usize {
        self.script.lock().unwrap().pip_starts
    }

    pub fn set_access_log(&self, log: Vec<AccessLogEvent>) {
        self.script.lock().unwrap().access_log = log;
    }

    pub fn set_presentation_size(&self, size: Option<(u32, u32)>) {
        self.script.lock().unwrap().presentation_size = size;
    }

    pub fn set_codec(&self, kind: TrackKind, codec: &str) {
        self.script
            .lock()
            .unwrap()
            .codecs
            .insert(kind, codec.to_string());
    }

    pub fn set_thumbnail_source(&self, source: Arc<FakeThumbnailSource>) {
        self.script.lock().unwrap().thumbnails = Some(source);
    }

    pub fn current_item(&self) -> Option<Url> {
        self.script.lock().unwrap().item.clone()
    }
}

impl GstEngine for FakeGstEngine {
    fn subscribe(&self, listener: Listener<GstEvent>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }

    fn replace_item(&self, url: &Url) {
        let mut script = self.script.lock().unwrap();
        script.item = Some(url.clone());
        script.prerolled = false;
        script.rate = 1.0;
        script.current = None;
        script.selected.clear();
        script.status = Some(TimeControlStatus::Paused);
    }

    fn has_item(&self) -> bool {
        self.script.lock().unwrap().item.is_some()
    }

    fn play(&self) {
        let mut script = self.script.lock().unwrap();
        script.play_count += 1;
        script.rate = 1.0;
        script.status = Some(TimeControlStatus::Playing);
    }

    fn pause(&self) {
        self.script.lock().unwrap().status = Some(TimeControlStatus::Paused);
    }

    fn rate(&self) -> f64 {
        self.script.lock().unwrap().rate
    }

    fn set_rate(&self, rate: f64) {
        let mut script = self.script.lock().unwrap();
        if script.prerolled {
            script.rate = rate;
        }
    }

    fn time_control_status(&self) -> TimeControlStatus {
        self.script
            .lock()
            .unwrap()
            .status
            .unwrap_or(TimeControlStatus::Paused)
    }

    fn current_time(&self) -> Option<Duration> {
        self.script.lock().unwrap().current
    }

    fn duration(&self) -> Option<Duration> {
        self.script.lock().unwrap().duration
    }

    fn loaded_time_range(&self) -> Option<Duration> {
        self.script.lock().unwrap().loaded
    }

    fn seek(&self, to: Duration, done: SeekCallback) {
        let mut script = self.script.lock().unwrap();
        script.seek_log.push(to);
        script.pending_seeks.push((to, done));
    }

    fn media_selection_group(
        &self,
        characteristic: MediaCharacteristic,
    ) -> Option<Vec<MediaOption>> {
        let script = self.script.lock().unwrap();
        script.item.as_ref()?;
        Some(
            script
                .options
                .get(&characteristic)
                .cloned()
                .unwrap_or_default(),
        )
    }

    fn selected_media_option(&self, characteristic: MediaCharacteristic) -> Option<usize> {
        self.script
            .lock()
            .unwrap()
            .selected
            .get(&characteristic)
            .copied()
    }

    fn select_media_option(&self, characteristic: MediaCharacteristic, index: Option<usize>) {
        let mut script = self.script.lock().unwrap();
        match index {
            Some(index) => script.selected.insert(characteristic, index),
            None => script.selected.remove(&characteristic),
        };
    }

    fn create_surface(&self) -> RenderSurface {
        self.script.lock().unwrap().surfaces += 1;
        RenderSurface::allocate(PlayerBackend::GStreamer)
    }

    fn set_video_gravity(&self, mode: ZoomMode) {
        self.script.lock().unwrap().gravity = Some(mode);
    }

    fn pip_supported(&self) -> bool {
        self.script.lock().unwrap().pip_supported
    }

    fn start_pip(&self) {
        self.script.lock().unwrap().pip_starts += 1;
    }

    fn stop_pip(&self) {}

    fn access_log(&self) -> Vec<AccessLogEvent> {
        self.script.lock().unwrap().access_log.clone()
    }

    fn presentation_size(&self) -> Option<(u32, u32)> {
        self.script.lock().unwrap().presentation_size
    }

    fn codec(&self, kind: TrackKind) -> Option<String> {
        self.script.lock().unwrap().codecs.get(&kind).cloned()
    }

    fn channel_layout(&self) -> Option<String> {
        None
    }

    fn thumbnail_source(&self) -> Option<Arc<dyn ThumbnailSource>> {
        self.script
            .lock()
            .unwrap()
            .thumbnails
            .clone()
            .map(|source| source as Arc<dyn ThumbnailSource>)
    }
}

#[derive(Default)]
struct MpvScript {
    media: Option<(Url, Vec<String>)>,
    playing: bool,
    state: Option<MpvState>,
    rate: Option<f32>,
    time_ms: i64,
    length_ms: i64,
    positions: Vec<f64>,
    tracks: HashMap<TrackKind, Vec<MpvTrack>>,
    play_count: usize,
    surfaces: usize,
    drawable: Option<RenderSurface>,
    aspect_ratio: Option<String>,
    stats: MpvStats,
    thumbnails: Option<Arc<FakeThumbnailSource>>,
}

/// In-memory stand-in for an mpv handle.
#[derive(Default)]
pub struct FakeMpvEngine {
    listeners: Listeners<MpvEvent>,
    script: Mutex<MpvScript>,
}

impl FakeMpvEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: MpvEvent) {
        self.listeners.emit(&event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_length_ms(&self, length_ms: i64) {
        self.script.lock().unwrap().length_ms = length_ms;
    }

    pub fn set_tracks(&self, kind: TrackKind, tracks: Vec<MpvTrack>) {
        self.script.lock().unwrap().tracks.insert(kind, tracks);
    }

    pub fn selected_index(&self, kind: TrackKind) -> Option<usize> {
        self.script
            .lock()
            .unwrap()
            .tracks
            .get(&kind)
            .and_then(|tracks| tracks.iter().position(|t| t.selected))
    }

    pub fn positions(&self) -> Vec<f64> {
        self.script.lock().unwrap().positions.clone()
    }

    pub fn play_count(&self) -> usize {
        self.script.lock().unwrap().play_count
    }

    pub fn surfaces_created(&self) -> usize {
        self.script.lock().unwrap().surfaces
    }

    pub fn aspect_ratio(&self) -> Option<String> {
        self.script.lock().unwrap().aspect_ratio.clone()
    }

    pub fn last_media(&self) -> Option<(Url, Vec<String>)> {
        self.script.lock().unwrap().media.clone()
    }

    pub fn set_stats(&self, stats: MpvStats) {
        self.script.lock().unwrap().stats = stats;
    }

    pub fn set_thumbnail_source(&self, source: Arc<FakeThumbnailSource>) {
        self.script.lock().unwrap().thumbnails = Some(source);
    }
}

impl MpvEngine for FakeMpvEngine {
    fn subscribe(&self, listener: Listener<MpvEvent>) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }

    fn set_media(&self, url: &Url, options: &[String]) {
        let mut script = self.script.lock().unwrap();
        script.media = Some((url.clone(), options.to_vec()));
        script.time_ms = 0;
        script.positions.clear();
        script.state = Some(MpvState::Opening);
    }

    fn has_media(&self) -> bool {
        self.script.lock().unwrap().media.is_some()
    }

    fn play(&self) {
        let mut script = self.script.lock().unwrap();
        script.play_count += 1;
        script.playing = true;
        script.state = Some(MpvState::Playing);
    }

    fn pause(&self) {
        let mut script = self.script.lock().unwrap();
        script.playing = false;
        script.state = Some(MpvState::Paused);
    }

    fn stop(&self) {
        let mut script = self.script.lock().unwrap();
        script.playing = false;
        script.state = Some(MpvState::Stopped);
    }

    fn is_playing(&self) -> bool {
        self.script.lock().unwrap().playing
    }

    fn state(&self) -> MpvState {
        self.script.lock().unwrap().state.unwrap_or(MpvState::Idle)
    }

    fn rate(&self) -> f32 {
        self.script.lock().unwrap().rate.unwrap_or(1.0)
    }

    fn set_rate(&self, rate: f32) {
        self.script.lock().unwrap().rate = Some(rate);
    }

    fn time_ms(&self) -> i64 {
        self.script.lock().unwrap().time_ms
    }

    fn length_ms(&self) -> i64 {
        self.script.lock().unwrap().length_ms
    }

    fn position(&self) -> f64 {
        let script = self.script.lock().unwrap();
        if script.length_ms > 0 {
            script.time_ms as f64 / script.length_ms as f64
        } else {
            0.0
        }
    }

    fn set_position(&self, fraction: f64) {
        let mut script = self.script.lock().unwrap();
        script.positions.push(fraction);
        script.time_ms = (fraction * script.length_ms as f64) as i64;
    }

    fn tracks(&self, kind: TrackKind) -> Vec<MpvTrack> {
        self.script
            .lock()
            .unwrap()
            .tracks
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    fn select_track(&self, kind: TrackKind, index: usize) {
        let mut script = self.script.lock().unwrap();
        if let Some(tracks) = script.tracks.get_mut(&kind) {
            for (position, track) in tracks.iter_mut().enumerate() {
                track.selected = position == index;
            }
        }
    }

    fn disable_track(&self, kind: TrackKind) {
        let mut script = self.script.lock().unwrap();
        if let Some(tracks) = script.tracks.get_mut(&kind) {
            for track in tracks.iter_mut() {
                track.selected = false;
            }
        }
    }

    fn create_surface(&self) -> RenderSurface {
        self.script.lock().unwrap().surfaces += 1;
        RenderSurface::allocate(PlayerBackend::Mpv)
    }

    fn set_drawable(&self, surface: RenderSurface) {
        self.script.lock().unwrap().drawable = Some(surface);
    }

    fn has_drawable(&self) -> bool {
        self.script.lock().unwrap().drawable.is_some()
    }

    fn set_aspect_ratio(&self, ratio: &str) {
        self.script.lock().unwrap().aspect_ratio = Some(ratio.to_string());
    }

    fn stats(&self) -> MpvStats {
        self.script.lock().unwrap().stats.clone()
    }

    fn thumbnail_source(&self) -> Option<Arc<dyn ThumbnailSource>> {
        self.script
            .lock()
            .unwrap()
            .thumbnails
            .clone()
            .map(|source| source as Arc<dyn ThumbnailSource>)
    }
}

/// Hands out fresh fakes and keeps them so tests can script and inspect them.
#[derive(Default)]
pub struct FakeEngineFactory {
    gstreamer: Mutex<Vec<Arc<FakeGstEngine>>>,
    mpv: Mutex<Vec<Arc<FakeMpvEngine>>>,
    unavailable: Mutex<Vec<PlayerBackend>>,
}

impl FakeEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn make_unavailable(&self, backend: PlayerBackend) {
        self.unavailable.lock().unwrap().push(backend);
    }

    pub fn gstreamer_engines(&self) -> Vec<Arc<FakeGstEngine>> {
        self.gstreamer.lock().unwrap().clone()
    }

    pub fn mpv_engines(&self) -> Vec<Arc<FakeMpvEngine>> {
        self.mpv.lock().unwrap().clone()
    }

    fn check(&self, backend: PlayerBackend) -> Result<(), PlayerError> {
        if self.unavailable.lock().unwrap().contains(&backend) {
            Err(PlayerError::BackendUnavailable(backend))
        } else {
            Ok(())
        }
    }
}

impl EngineFactory for FakeEngineFactory {
    fn gstreamer(&self, _config: &Config) -> Result<Arc<dyn GstEngine>, PlayerError> {
        self.check(PlayerBackend::GStreamer)?;
        let engine = FakeGstEngine::new();
        self.gstreamer.lock().unwrap().push(engine.clone());
        Ok(engine)
    }

    fn mpv(&self, _config: &Config) -> Result<Arc<dyn MpvEngine>, PlayerError> {
        self.check(PlayerBackend::Mpv)?;
        let engine = FakeMpvEngine::new();
        self.mpv.lock().unwrap().push(engine.clone());
        Ok(engine)
    }
}
