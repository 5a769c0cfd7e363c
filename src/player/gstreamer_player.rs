use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use super::events::SubscriptionId;
use super::gstreamer::engine::{
    GstEngine, GstEvent, MediaCharacteristic, MediaOption, TimeControlStatus,
};
use super::inflight::LatestRequest;
use super::manager::ManagerSink;
use super::thumbnail::ThumbnailGenerator;
use super::traits::{
    GestureHandling, MediaLoading, MediaPlayer, PlaybackControl, StreamingInfoReporting,
    ThumbnailGeneration, TimeControl, TrackSelection, ViewRendering,
};
use super::types::{
    PlayerBackend, RenderSurface, SeekCompletion, StreamingInfo, ThumbnailCompletion, TrackInfo,
    TrackKind, TrackSelector, ZoomMode, clamp_seek_target, seek_position,
};
use crate::config::Config;

/// State reachable from engine callbacks. Never holds the adapter itself.
struct Shared {
    engine: Weak<dyn GstEngine>,
    sink: ManagerSink,
    seek: LatestRequest<bool>,
    // Descriptors of the current item, built once so synthesized ids stay stable
    tracks: Mutex<HashMap<MediaCharacteristic, Vec<TrackInfo>>>,
    pending_resume: Mutex<Option<f64>>,
    speed: Mutex<f32>,
    torn_down: AtomicBool,
}

pub struct GStreamerPlayer {
    engine: Arc<dyn GstEngine>,
    shared: Arc<Shared>,
    subscription: Mutex<Option<SubscriptionId>>,
    view: Mutex<Option<RenderSurface>>,
    // Surface the PiP controller is bound to, set up with the first view
    pip_surface: Mutex<Option<RenderSurface>>,
    thumbnails: ThumbnailGenerator,
}

impl GStreamerPlayer {
    pub fn new(engine: Arc<dyn GstEngine>, sink: ManagerSink, config: &Config) -> Self {
        debug!("Initializing GStreamer player");

        let speed = config.playback.default_speed;
        let shared = Arc::new(Shared {
            engine: Arc::downgrade(&engine),
            sink,
            seek: LatestRequest::new("seek"),
            tracks: Mutex::new(HashMap::new()),
            pending_resume: Mutex::new(None),
            speed: Mutex::new(speed),
            torn_down: AtomicBool::new(false),
        });

        let handler_state = shared.clone();
        let subscription = engine.subscribe(Box::new(move |event| {
            handler_state.handle_event(event);
        }));

        if speed != 1.0 {
            shared.sink.apply(move |m| m.set_playback_speed(speed));
        }

        Self {
            engine,
            shared,
            subscription: Mutex::new(Some(subscription)),
            view: Mutex::new(None),
            pip_surface: Mutex::new(None),
            thumbnails: ThumbnailGenerator::new("GStreamerPlayer", config.thumbnails.max_width),
        }
    }

    fn current_track(&self, characteristic: MediaCharacteristic) -> Option<TrackInfo> {
        let index = self.engine.selected_media_option(characteristic)?;
        self.shared
            .tracks_for(self.engine.as_ref(), characteristic)
            .into_iter()
            .nth(index)
    }

    fn publish_selection(&self) {
        let audio = self.current_track(MediaCharacteristic::Audible);
        let subtitle = self.current_track(MediaCharacteristic::Legible);
        self.shared
            .sink
            .apply(move |m| m.set_selected_tracks(audio, subtitle));
    }
}

impl Shared {
    fn handle_event(&self, event: &GstEvent) {
        if self.torn_down.load(Ordering::Acquire) {
            trace!("GStreamerPlayer: ignoring {:?} after teardown", event);
            return;
        }

        match event {
            GstEvent::ItemReady => self.on_item_ready(),
            GstEvent::ItemFailed(reason) => {
                warn!("GStreamerPlayer: item failed to load: {}", reason);
                self.pending_resume.lock().unwrap().take();
                self.sink.apply(|m| m.set_media_ready(false));
            }
            GstEvent::TimeChanged(seconds) => {
                let seconds = *seconds;
                if seconds.is_finite() {
                    self.sink.apply(move |m| m.set_current_time(seconds));
                }
            }
            GstEvent::DurationChanged(seconds) => {
                let seconds = finite_or_zero(*seconds);
                self.sink.apply(move |m| m.set_duration(seconds));
            }
            GstEvent::StatusChanged(status) => {
                let playing = *status == TimeControlStatus::Playing;
                let buffering = *status == TimeControlStatus::WaitingToPlay;
                self.sink.apply(move |m| {
                    m.set_playing(playing);
                    m.set_buffering(buffering);
                });
            }
            GstEvent::RateChanged(rate) => {
                // A zero rate only means paused
                if *rate > 0.0 {
                    let rate = *rate as f32;
                    self.sink.apply(move |m| m.set_playback_speed(rate));
                }
            }
            GstEvent::LoadedRangeChanged(seconds) => {
                let seconds = finite_or_zero(*seconds);
                self.sink.apply(move |m| m.set_buffered_duration(seconds));
            }
            GstEvent::PlaybackEnded => self.sink.apply(|m| m.video_did_end()),
            GstEvent::PipStarted => self.sink.apply(|m| m.set_pip_active(true)),
            GstEvent::PipStopped => self.sink.apply(|m| m.set_pip_active(false)),
        }
    }

    fn on_item_ready(&self) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        info!("GStreamerPlayer: item ready");

        let duration = engine.duration().map(|d| d.as_secs_f64()).unwrap_or(0.0);
        let audio = self.tracks_for(engine.as_ref(), MediaCharacteristic::Audible);
        let subtitles = self.tracks_for(engine.as_ref(), MediaCharacteristic::Legible);
        let selected_audio = engine
            .selected_media_option(MediaCharacteristic::Audible)
            .and_then(|i| audio.get(i).cloned());
        let selected_subtitle = engine
            .selected_media_option(MediaCharacteristic::Legible)
            .and_then(|i| subtitles.get(i).cloned());

        self.sink.apply(move |m| {
            m.set_media_ready(true);
            m.set_duration(finite_or_zero(duration));
            m.update_track_info(audio, subtitles, Vec::new());
            m.set_selected_tracks(selected_audio, selected_subtitle);
        });

        // The pipeline drops rate changes made before it prerolled
        let speed = *self.speed.lock().unwrap();
        if speed != 1.0 && engine.time_control_status() != TimeControlStatus::Paused {
            debug!("GStreamerPlayer: applying playback speed {}", speed);
            engine.set_rate(speed as f64);
        }

        let resume = self.pending_resume.lock().unwrap().take();
        if let Some(position) = resume {
            debug!("GStreamerPlayer: resuming at {:.1}s", position);
            drop(self.start_seek(engine.as_ref(), position));
        }
    }

    /// Build or return the cached descriptors of one selection group.
    fn tracks_for(
        &self,
        engine: &dyn GstEngine,
        characteristic: MediaCharacteristic,
    ) -> Vec<TrackInfo> {
        if let Some(tracks) = self.tracks.lock().unwrap().get(&characteristic) {
            return tracks.clone();
        }

        // No group means the item is not ready yet; nothing to cache
        let Some(options) = engine.media_selection_group(characteristic) else {
            return Vec::new();
        };

        let kind = characteristic.track_kind();
        let tracks: Vec<TrackInfo> = options
            .iter()
            .map(|option| describe_option(kind, option))
            .collect();
        self.tracks
            .lock()
            .unwrap()
            .entry(characteristic)
            .or_insert(tracks)
            .clone()
    }

    fn start_seek(&self, engine: &dyn GstEngine, seconds: f64) -> SeekCompletion {
        let duration = engine.duration().map(|d| d.as_secs_f64()).unwrap_or(0.0);
        let target = clamp_seek_target(seconds, duration);
        if target != seconds {
            debug!(
                "GStreamerPlayer: clamped seek from {:.3}s to {:.3}s",
                seconds, target
            );
        }

        let (ticket, completion) = self.seek.begin();
        let Some(position) = seek_position(target) else {
            warn!("GStreamerPlayer: seek target {}s is out of range", target);
            ticket.complete(false);
            return completion;
        };
        self.sink.apply(move |m| m.begin_seek(target));

        let sink = self.sink.clone();
        engine.seek(
            position,
            Box::new(move |finished| {
                if !ticket.complete(finished) {
                    trace!("GStreamerPlayer: superseded seek finished");
                    return;
                }
                sink.apply(move |m| {
                    m.end_seek();
                    if finished {
                        m.set_current_time(target);
                    }
                });
            }),
        );

        completion
    }
}

/// Descriptor for a media-selection option. The id prefers the language tag,
/// then the locale, and falls back to a random one.
fn describe_option(kind: TrackKind, option: &MediaOption) -> TrackInfo {
    let id = option
        .extended_language_tag
        .clone()
        .or_else(|| option.locale_identifier.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let language_code = option
        .extended_language_tag
        .clone()
        .or_else(|| option.language_code.clone());
    TrackInfo::new(kind, id, option.display_name.clone(), language_code)
}

fn finite_or_zero(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}

impl PlaybackControl for GStreamerPlayer {
    fn is_playing(&self) -> bool {
        self.engine.time_control_status() == TimeControlStatus::Playing
    }

    fn playback_speed(&self) -> f32 {
        *self.shared.speed.lock().unwrap()
    }

    fn set_playback_speed(&self, speed: f32) {
        if !speed.is_finite() || speed <= 0.0 {
            warn!("GStreamerPlayer: ignoring invalid playback speed {}", speed);
            return;
        }
        *self.shared.speed.lock().unwrap() = speed;

        // Setting a rate on a paused pipeline would start it
        if self.engine.time_control_status() != TimeControlStatus::Paused {
            self.engine.set_rate(speed as f64);
        }
        self.shared.sink.apply(move |m| m.set_playback_speed(speed));
        debug!("GStreamerPlayer: playback speed set to {}", speed);
    }

    fn play(&self) {
        debug!("GStreamerPlayer: play");
        self.engine.play();
        let speed = *self.shared.speed.lock().unwrap();
        if speed != 1.0 {
            self.engine.set_rate(speed as f64);
        }
    }

    fn pause(&self) {
        debug!("GStreamerPlayer: pause");
        self.engine.pause();
    }

    fn stop(&self) {
        debug!("GStreamerPlayer: stop");
        self.engine.pause();
        drop(self.shared.start_seek(self.engine.as_ref(), 0.0));
    }
}

impl TimeControl for GStreamerPlayer {
    fn current_time(&self) -> f64 {
        self.engine
            .current_time()
            .map(|t| t.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> f64 {
        finite_or_zero(
            self.engine
                .duration()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        )
    }

    fn buffered_duration(&self) -> f64 {
        self.engine
            .loaded_time_range()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn is_buffering(&self) -> bool {
        self.engine.time_control_status() == TimeControlStatus::WaitingToPlay
    }

    fn seek(&self, seconds: f64) -> SeekCompletion {
        debug!("GStreamerPlayer: seek to {:.3}s", seconds);
        self.shared.start_seek(self.engine.as_ref(), seconds)
    }
}

impl TrackSelection for GStreamerPlayer {
    fn audio_tracks(&self) -> Vec<TrackInfo> {
        self.shared
            .tracks_for(self.engine.as_ref(), MediaCharacteristic::Audible)
    }

    fn subtitle_tracks(&self) -> Vec<TrackInfo> {
        self.shared
            .tracks_for(self.engine.as_ref(), MediaCharacteristic::Legible)
    }

    fn current_audio_track(&self) -> Option<TrackInfo> {
        self.current_track(MediaCharacteristic::Audible)
    }

    fn current_subtitle_track(&self) -> Option<TrackInfo> {
        self.current_track(MediaCharacteristic::Legible)
    }

    fn select_audio_track(&self, selector: &TrackSelector) {
        let tracks = self.audio_tracks();
        match selector.resolve(&tracks) {
            Some(index) => {
                debug!("GStreamerPlayer: selecting audio track {}", tracks[index].name);
                self.engine
                    .select_media_option(MediaCharacteristic::Audible, Some(index));
                self.publish_selection();
            }
            None => warn!("GStreamerPlayer: no audio track matches {:?}", selector),
        }
    }

    fn select_subtitle_track(&self, selector: Option<&TrackSelector>) {
        let Some(selector) = selector else {
            debug!("GStreamerPlayer: disabling subtitles");
            self.engine
                .select_media_option(MediaCharacteristic::Legible, None);
            self.publish_selection();
            return;
        };

        let tracks = self.subtitle_tracks();
        match selector.resolve(&tracks) {
            Some(index) => {
                debug!("GStreamerPlayer: selecting subtitle track {}", tracks[index].name);
                self.engine
                    .select_media_option(MediaCharacteristic::Legible, Some(index));
            }
            None => {
                // Unknown ids turn subtitles off rather than keeping a stale choice
                warn!(
                    "GStreamerPlayer: no subtitle track matches {:?}, disabling subtitles",
                    selector
                );
                self.engine
                    .select_media_option(MediaCharacteristic::Legible, None);
            }
        }
        self.publish_selection();
    }

    fn select_video_track(&self, selector: &TrackSelector) {
        warn!(
            "GStreamerPlayer: video track selection is not supported ({:?})",
            selector
        );
    }
}

#[async_trait]
impl MediaLoading for GStreamerPlayer {
    async fn load(&self, url: &Url, resume_position: Option<f64>) {
        info!("GStreamerPlayer: loading media {}", url);

        self.shared.seek.cancel();
        self.shared.tracks.lock().unwrap().clear();
        self.thumbnails.reset();
        *self.shared.pending_resume.lock().unwrap() =
            resume_position.filter(|p| p.is_finite() && *p > 0.0);
        self.shared.sink.apply(|m| m.reset_for_new_item());

        self.engine.replace_item(url);
        // The pipeline queues the request until the item is ready
        self.play();
    }
}

impl ViewRendering for GStreamerPlayer {
    fn player_view(&self) -> RenderSurface {
        let surface = {
            let mut view = self.view.lock().unwrap();
            if let Some(surface) = *view {
                return surface;
            }
            let surface = self.engine.create_surface();
            debug!("GStreamerPlayer: created render surface {}", surface.id);
            *view = Some(surface);
            surface
        };
        self.setup_pip();
        surface
    }

    fn setup_pip(&self) {
        let Some(surface) = *self.view.lock().unwrap() else {
            warn!("GStreamerPlayer: no render surface available for PiP");
            return;
        };
        *self.pip_surface.lock().unwrap() = Some(surface);
        debug!("GStreamerPlayer: PiP controller bound to surface {}", surface.id);
    }

    fn start_pip(&self) {
        if !self.engine.pip_supported() {
            warn!("GStreamerPlayer: PiP is not supported on this platform");
            return;
        }
        if self.pip_surface.lock().unwrap().is_none() {
            warn!("GStreamerPlayer: PiP requested before a view was created");
            return;
        }
        self.engine.start_pip();
    }

    fn stop_pip(&self) {
        if self.pip_surface.lock().unwrap().is_some() {
            self.engine.stop_pip();
        }
    }
}

impl ThumbnailGeneration for GStreamerPlayer {
    fn generate_thumbnail(&self, seconds: f64) -> ThumbnailCompletion {
        let engine = &self.engine;
        self.thumbnails.generate(seconds, || {
            if engine.has_item() {
                engine.thumbnail_source()
            } else {
                None
            }
        })
    }
}

impl GestureHandling for GStreamerPlayer {
    fn handle_pinch(&self, scale: f64) {
        if self.view.lock().unwrap().is_none() {
            trace!("GStreamerPlayer: pinch ignored without a view");
            return;
        }
        let mode = if scale > 1.0 {
            ZoomMode::Fill
        } else {
            ZoomMode::Fit
        };
        debug!("GStreamerPlayer: pinch {:.2} -> {}", scale, mode);
        self.engine.set_video_gravity(mode);
    }
}

impl StreamingInfoReporting for GStreamerPlayer {
    fn streaming_info(&self) -> StreamingInfo {
        if !self.engine.has_item() {
            return StreamingInfo::placeholder();
        }

        let log = self.engine.access_log();
        let last = log.last();

        StreamingInfo {
            server: log.iter().rev().find_map(|e| e.server_address.clone()),
            bitrates: log.iter().filter_map(|e| e.indicated_bitrate).collect(),
            observed_bitrate: last.and_then(|e| e.observed_bitrate),
            buffer_duration: self.engine.loaded_time_range().map(|d| d.as_secs_f64()),
            video_codec: self.engine.codec(TrackKind::Video),
            audio_codec: self.engine.codec(TrackKind::Audio),
            resolution: self
                .engine
                .presentation_size()
                .filter(|(w, h)| *w > 0 && *h > 0),
            video_bitrate: last.and_then(|e| e.indicated_bitrate),
            track_name: self.current_audio_track().map(|t| t.name),
            channels: self.engine.channel_layout(),
        }
    }
}

impl MediaPlayer for GStreamerPlayer {
    fn backend(&self) -> PlayerBackend {
        PlayerBackend::GStreamer
    }

    fn teardown(&self) {
        if self.shared.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(id) = self.subscription.lock().unwrap().take() {
            self.engine.unsubscribe(id);
        }
        self.shared.seek.cancel();
        self.thumbnails.reset();
        debug!("GStreamerPlayer: detached from engine");
    }
}

impl Drop for GStreamerPlayer {
    fn drop(&mut self) {
        debug!("GStreamerPlayer - Dropping player");
        self.teardown();
    }
}
