//! [`GstEngine`] backed by a GStreamer `playbin` pipeline.
//!
//! Bus messages are drained on a dedicated thread that also publishes the
//! periodic clock and buffered-range reports.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::bus_handler::handle_bus_message;
use super::engine::{
    AccessLogEvent, GstEngine, GstEvent, MediaCharacteristic, MediaOption, SeekCallback,
    TimeControlStatus,
};
use crate::config::Config;
use crate::player::events::{Listener, Listeners, SubscriptionId};
use crate::player::thumbnail::{FrameCallback, ThumbnailSource};
use crate::player::types::{PlayerBackend, RenderSurface, TrackKind, ZoomMode};
use crate::utils::errors::PlayerError;

pub(super) const SEEK_FAILED_MESSAGE: &str = "dualplay-seek-failed";

const TICK_INTERVAL: Duration = Duration::from_millis(250);
const PLAYBIN_FLAGS: &str = "soft-colorbalance+deinterlace+soft-volume+audio+video+text";
const PLAYBIN_FLAGS_NO_TEXT: &str = "soft-colorbalance+deinterlace+soft-volume+audio+video";

pub(super) fn clock_to_seconds(time: gst::ClockTime) -> f64 {
    time.nseconds() as f64 / 1_000_000_000.0
}

/// State shared between the engine and its bus thread.
pub(super) struct BusShared {
    pub(super) listeners: Listeners<GstEvent>,
    pending_seek: Mutex<Option<SeekCallback>>,
    status: Mutex<TimeControlStatus>,
    want_playing: AtomicBool,
    awaiting_preroll: AtomicBool,
    access_log: Mutex<Vec<AccessLogEvent>>,
    server: Mutex<Option<String>>,
}

impl BusShared {
    fn new() -> Self {
        Self {
            listeners: Listeners::new(),
            pending_seek: Mutex::new(None),
            status: Mutex::new(TimeControlStatus::Paused),
            want_playing: AtomicBool::new(false),
            awaiting_preroll: AtomicBool::new(false),
            access_log: Mutex::new(Vec::new()),
            server: Mutex::new(None),
        }
    }

    pub(super) fn want_playing(&self) -> bool {
        self.want_playing.load(Ordering::Acquire)
    }

    pub(super) fn set_want_playing(&self, playing: bool) {
        self.want_playing.store(playing, Ordering::Release);
    }

    pub(super) fn awaiting_preroll(&self) -> bool {
        self.awaiting_preroll.load(Ordering::Acquire)
    }

    pub(super) fn finish_preroll(&self) {
        self.awaiting_preroll.store(false, Ordering::Release);
    }

    pub(super) fn status(&self) -> TimeControlStatus {
        *self.status.lock().unwrap()
    }

    pub(super) fn set_status(&self, status: TimeControlStatus) {
        let changed = {
            let mut current = self.status.lock().unwrap();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            self.listeners.emit(&GstEvent::StatusChanged(status));
        }
    }

    pub(super) fn take_pending_seek(&self) -> Option<SeekCallback> {
        self.pending_seek.lock().unwrap().take()
    }

    pub(super) fn fail_pending_seek(&self) {
        if let Some(done) = self.take_pending_seek() {
            done(false);
        }
    }

    pub(super) fn record_access(&self, event: AccessLogEvent) {
        self.access_log.lock().unwrap().push(event);
    }

    pub(super) fn server_address(&self) -> Option<String> {
        self.server.lock().unwrap().clone()
    }
}

pub struct PlaybinEngine {
    playbin: gst::Element,
    shared: Arc<BusShared>,
    item: Mutex<Option<Url>>,
    rate: AtomicU64,
    running: Arc<AtomicBool>,
    bus_thread: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybinEngine {
    pub fn new(_config: &Config) -> Result<Arc<Self>, PlayerError> {
        gst::init().map_err(|e| PlayerError::Engine(format!("GStreamer init failed: {}", e)))?;

        let playbin = gst::ElementFactory::make("playbin")
            .name("player")
            .build()
            .map_err(|e| {
                PlayerError::Engine(format!(
                    "Failed to create playbin element, GStreamer plugins may be missing: {}",
                    e
                ))
            })?;
        playbin.set_property_from_str("flags", PLAYBIN_FLAGS);
        info!("PlaybinEngine: created {}", playbin.name());

        let bus = playbin
            .bus()
            .ok_or_else(|| PlayerError::Engine("playbin has no bus".to_string()))?;

        let shared = Arc::new(BusShared::new());
        let running = Arc::new(AtomicBool::new(true));

        let thread_playbin = playbin.clone();
        let thread_shared = shared.clone();
        let thread_running = running.clone();
        let bus_thread = std::thread::Builder::new()
            .name("playbin-bus".to_string())
            .spawn(move || {
                debug!("PlaybinEngine: bus thread started");
                let mut last_tick = Instant::now();
                while thread_running.load(Ordering::Acquire) {
                    if let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(100)) {
                        handle_bus_message(&msg, &thread_playbin, &thread_shared);
                    }
                    if last_tick.elapsed() >= TICK_INTERVAL {
                        last_tick = Instant::now();
                        publish_clock(&thread_playbin, &thread_shared);
                    }
                }
                debug!("PlaybinEngine: bus thread stopped");
            })
            .map_err(|e| PlayerError::Engine(format!("Failed to start bus thread: {}", e)))?;

        Ok(Arc::new(Self {
            playbin,
            shared,
            item: Mutex::new(None),
            rate: AtomicU64::new(1.0f64.to_bits()),
            running,
            bus_thread: Mutex::new(Some(bus_thread)),
        }))
    }

    fn tags(&self, characteristic: MediaCharacteristic, index: i32) -> Option<gst::TagList> {
        let signal = match characteristic {
            MediaCharacteristic::Audible => "get-audio-tags",
            MediaCharacteristic::Legible => "get-text-tags",
        };
        self.playbin
            .emit_by_name::<Option<gst::TagList>>(signal, &[&index])
    }

    fn pad_caps(&self, kind: TrackKind) -> Option<gst::Caps> {
        let signal = match kind {
            TrackKind::Audio => "get-audio-pad",
            TrackKind::Video => "get-video-pad",
            TrackKind::Subtitle => "get-text-pad",
        };
        let index = match kind {
            TrackKind::Audio => self.playbin.property::<i32>("current-audio"),
            TrackKind::Video => self.playbin.property::<i32>("current-video"),
            TrackKind::Subtitle => self.playbin.property::<i32>("current-text"),
        }
        .max(0);
        self.playbin
            .emit_by_name::<Option<gst::Pad>>(signal, &[&index])?
            .current_caps()
    }

    fn video_sink(&self) -> Option<gst::Element> {
        self.playbin.property::<Option<gst::Element>>("video-sink")
    }
}

/// Periodic clock and buffered-range reports while playing.
fn publish_clock(playbin: &gst::Element, shared: &BusShared) {
    if shared.status() != TimeControlStatus::Playing {
        return;
    }
    if let Some(position) = playbin.query_position::<gst::ClockTime>() {
        shared
            .listeners
            .emit(&GstEvent::TimeChanged(clock_to_seconds(position)));
    }
    if let Some(loaded) = buffered_end(playbin) {
        shared
            .listeners
            .emit(&GstEvent::LoadedRangeChanged(clock_to_seconds(loaded)));
    }
}

fn buffered_end(playbin: &gst::Element) -> Option<gst::ClockTime> {
    let mut query = gst::query::Buffering::new(gst::Format::Time);
    if !playbin.query(&mut query) {
        return None;
    }
    let (_, stop, _) = query.range();
    u64::try_from(stop.value())
        .ok()
        .map(gst::ClockTime::from_nseconds)
}

/// None for positions GStreamer cannot express (`u64::MAX` means no time).
fn to_clock_time(position: Duration) -> Option<gst::ClockTime> {
    u64::try_from(position.as_nanos())
        .ok()
        .filter(|nanos| *nanos != u64::MAX)
        .map(gst::ClockTime::from_nseconds)
}

fn to_duration(time: gst::ClockTime) -> Duration {
    Duration::from_nanos(time.nseconds())
}

impl GstEngine for PlaybinEngine {
    fn subscribe(&self, listener: Listener<GstEvent>) -> SubscriptionId {
        self.shared.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.listeners.unsubscribe(id);
    }

    fn replace_item(&self, url: &Url) {
        info!("PlaybinEngine: replacing item with {}", url);
        self.shared.fail_pending_seek();
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            warn!("PlaybinEngine: failed to reset pipeline: {:?}", e);
        }

        self.shared.access_log.lock().unwrap().clear();
        *self.shared.server.lock().unwrap() = url.host_str().map(str::to_string);
        self.shared.set_want_playing(false);
        self.shared.set_status(TimeControlStatus::Paused);
        self.shared.awaiting_preroll.store(true, Ordering::Release);
        self.rate.store(1.0f64.to_bits(), Ordering::Release);

        self.playbin.set_property("uri", url.as_str());
        *self.item.lock().unwrap() = Some(url.clone());

        if let Err(e) = self.playbin.set_state(gst::State::Paused) {
            error!("PlaybinEngine: failed to preroll {}: {:?}", url, e);
            self.shared.finish_preroll();
            self.shared
                .listeners
                .emit(&GstEvent::ItemFailed(format!("{:?}", e)));
        }
    }

    fn has_item(&self) -> bool {
        self.item.lock().unwrap().is_some()
    }

    fn play(&self) {
        self.shared.set_want_playing(true);
        if self.shared.status() != TimeControlStatus::Playing {
            self.shared.set_status(TimeControlStatus::WaitingToPlay);
        }
        if let Err(e) = self.playbin.set_state(gst::State::Playing) {
            error!("PlaybinEngine: failed to start playback: {:?}", e);
        }
    }

    fn pause(&self) {
        self.shared.set_want_playing(false);
        if let Err(e) = self.playbin.set_state(gst::State::Paused) {
            error!("PlaybinEngine: failed to pause: {:?}", e);
        }
        self.shared.set_status(TimeControlStatus::Paused);
    }

    fn rate(&self) -> f64 {
        if self.shared.status() == TimeControlStatus::Paused {
            0.0
        } else {
            f64::from_bits(self.rate.load(Ordering::Acquire))
        }
    }

    fn set_rate(&self, rate: f64) {
        if rate <= 0.0 {
            self.pause();
            return;
        }
        // Rate changes are a flushing seek from the current position
        let Some(position) = self.playbin.query_position::<gst::ClockTime>() else {
            warn!("PlaybinEngine: cannot change rate without a position");
            return;
        };
        match self.playbin.seek(
            rate,
            gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
            gst::SeekType::Set,
            position,
            gst::SeekType::None,
            gst::ClockTime::NONE,
        ) {
            Ok(()) => {
                self.rate.store(rate.to_bits(), Ordering::Release);
                debug!("PlaybinEngine: rate set to {}", rate);
                self.shared.listeners.emit(&GstEvent::RateChanged(rate));
                if !self.shared.want_playing() {
                    self.play();
                }
            }
            Err(e) => warn!("PlaybinEngine: failed to set rate {}: {}", rate, e),
        }
    }

    fn time_control_status(&self) -> TimeControlStatus {
        self.shared.status()
    }

    fn current_time(&self) -> Option<Duration> {
        self.playbin
            .query_position::<gst::ClockTime>()
            .map(to_duration)
    }

    fn duration(&self) -> Option<Duration> {
        self.playbin
            .query_duration::<gst::ClockTime>()
            .map(to_duration)
    }

    fn loaded_time_range(&self) -> Option<Duration> {
        buffered_end(&self.playbin).map(to_duration)
    }

    fn seek(&self, to: Duration, done: SeekCallback) {
        // Only one outstanding seek; a replaced one reports failure
        let previous = self.shared.pending_seek.lock().unwrap().replace(done);
        if let Some(previous) = previous {
            previous(false);
        }

        let result = match to_clock_time(to) {
            Some(target) => {
                // Carry the current rate; a plain seek would reset it to 1.0
                let rate = f64::from_bits(self.rate.load(Ordering::Acquire));
                trace!("PlaybinEngine: seeking to {} at rate {}", target, rate);
                self.playbin
                    .seek(
                        rate,
                        gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                        gst::SeekType::Set,
                        target,
                        gst::SeekType::None,
                        gst::ClockTime::NONE,
                    )
                    .map_err(|e| e.to_string())
            }
            None => Err(format!("position {:?} out of range", to)),
        };
        if let Err(e) = result {
            warn!("PlaybinEngine: seek to {:?} failed: {}", to, e);
            // Resolved on the bus thread, never before this call returns
            let message =
                gst::message::Application::new(gst::Structure::new_empty(SEEK_FAILED_MESSAGE));
            if self.playbin.post_message(message).is_err() {
                self.shared.fail_pending_seek();
            }
        }
    }

    fn media_selection_group(
        &self,
        characteristic: MediaCharacteristic,
    ) -> Option<Vec<MediaOption>> {
        if !self.has_item() || self.shared.awaiting_preroll() {
            return None;
        }
        let count = match characteristic {
            MediaCharacteristic::Audible => self.playbin.property::<i32>("n-audio"),
            MediaCharacteristic::Legible => self.playbin.property::<i32>("n-text"),
        };
        let options = (0..count.max(0))
            .map(|index| {
                let tags = self.tags(characteristic, index);
                let language = tags
                    .as_ref()
                    .and_then(|t| t.get::<gst::tags::LanguageCode>())
                    .map(|l| l.get().to_string());
                let title = tags
                    .as_ref()
                    .and_then(|t| t.get::<gst::tags::Title>())
                    .map(|t| t.get().to_string());
                MediaOption {
                    display_name: title
                        .or_else(|| language.clone())
                        .unwrap_or_else(|| format!("Track {}", index + 1)),
                    extended_language_tag: None,
                    locale_identifier: language.clone(),
                    language_code: language,
                }
            })
            .collect();
        Some(options)
    }

    fn selected_media_option(&self, characteristic: MediaCharacteristic) -> Option<usize> {
        let current = match characteristic {
            MediaCharacteristic::Audible => self.playbin.property::<i32>("current-audio"),
            MediaCharacteristic::Legible => {
                let flags = self.playbin.property_value("flags");
                let text_on = flags
                    .serialize()
                    .map(|s| s.contains("text"))
                    .unwrap_or(true);
                if !text_on {
                    return None;
                }
                self.playbin.property::<i32>("current-text")
            }
        };
        usize::try_from(current).ok()
    }

    fn select_media_option(&self, characteristic: MediaCharacteristic, index: Option<usize>) {
        match (characteristic, index) {
            (MediaCharacteristic::Audible, Some(index)) => {
                self.playbin.set_property("current-audio", index as i32);
            }
            (MediaCharacteristic::Audible, None) => {
                debug!("PlaybinEngine: audio cannot be deselected");
            }
            (MediaCharacteristic::Legible, Some(index)) => {
                self.playbin.set_property_from_str("flags", PLAYBIN_FLAGS);
                self.playbin.set_property("current-text", index as i32);
            }
            (MediaCharacteristic::Legible, None) => {
                self.playbin
                    .set_property_from_str("flags", PLAYBIN_FLAGS_NO_TEXT);
            }
        }
    }

    fn create_surface(&self) -> RenderSurface {
        if self.video_sink().is_none() {
            match gst::ElementFactory::make("autovideosink").build() {
                Ok(sink) => self.playbin.set_property("video-sink", &sink),
                Err(e) => warn!("PlaybinEngine: no video sink available: {}", e),
            }
        }
        RenderSurface::allocate(PlayerBackend::GStreamer)
    }

    fn set_video_gravity(&self, mode: ZoomMode) {
        let Some(sink) = self.video_sink() else {
            return;
        };
        if sink.find_property("force-aspect-ratio").is_some() {
            sink.set_property("force-aspect-ratio", mode == ZoomMode::Fit);
        } else {
            debug!("PlaybinEngine: {} cannot change gravity", sink.name());
        }
    }

    fn pip_supported(&self) -> bool {
        false
    }

    fn start_pip(&self) {
        warn!("PlaybinEngine: picture-in-picture is not available on this platform");
    }

    fn stop_pip(&self) {}

    fn access_log(&self) -> Vec<AccessLogEvent> {
        self.shared.access_log.lock().unwrap().clone()
    }

    fn presentation_size(&self) -> Option<(u32, u32)> {
        let caps = self.pad_caps(TrackKind::Video)?;
        let info = gst_video::VideoInfo::from_caps(&caps).ok()?;
        Some((info.width(), info.height()))
    }

    fn codec(&self, kind: TrackKind) -> Option<String> {
        let index = match kind {
            TrackKind::Audio => self.playbin.property::<i32>("current-audio"),
            TrackKind::Video => self.playbin.property::<i32>("current-video"),
            TrackKind::Subtitle => return None,
        }
        .max(0);
        let signal = match kind {
            TrackKind::Audio => "get-audio-tags",
            _ => "get-video-tags",
        };
        let tags = self
            .playbin
            .emit_by_name::<Option<gst::TagList>>(signal, &[&index])?;
        match kind {
            TrackKind::Audio => tags
                .get::<gst::tags::AudioCodec>()
                .map(|c| c.get().to_string()),
            _ => tags
                .get::<gst::tags::VideoCodec>()
                .map(|c| c.get().to_string()),
        }
    }

    fn channel_layout(&self) -> Option<String> {
        let caps = self.pad_caps(TrackKind::Audio)?;
        let structure = caps.structure(0)?;
        let channels = structure.get::<i32>("channels").ok()?;
        let layout = match channels {
            1 => "Mono".to_string(),
            2 => "Stereo".to_string(),
            6 => "5.1".to_string(),
            8 => "7.1".to_string(),
            n => format!("{} channels", n),
        };
        Some(match structure.get::<i32>("rate") {
            Ok(rate) => format!("{}, {:.1}kHz", layout, rate as f64 / 1000.0),
            Err(_) => layout,
        })
    }

    fn thumbnail_source(&self) -> Option<Arc<dyn ThumbnailSource>> {
        let uri = self.item.lock().unwrap().clone()?;
        Some(Arc::new(PlaybinFrameGrabber { uri }))
    }
}

impl Drop for PlaybinEngine {
    fn drop(&mut self) {
        debug!("PlaybinEngine: dropping, cleaning up resources");
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.bus_thread.lock().unwrap().take()
            && thread.join().is_err()
        {
            error!("PlaybinEngine: bus thread panicked");
        }
        self.shared.fail_pending_seek();
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            error!("PlaybinEngine: failed to set pipeline to NULL on drop: {:?}", e);
        }
    }
}

/// Grabs frames from a private, silent pipeline so the visible one is never
/// repositioned.
struct PlaybinFrameGrabber {
    uri: Url,
}

impl PlaybinFrameGrabber {
    fn grab_blocking(uri: &Url, seconds: f64) -> Result<RgbaImage, String> {
        let pipeline = gst::ElementFactory::make("playbin")
            .property("uri", uri.as_str())
            .build()
            .map_err(|e| e.to_string())?;
        for sink_property in ["video-sink", "audio-sink"] {
            let sink = gst::ElementFactory::make("fakesink")
                .build()
                .map_err(|e| e.to_string())?;
            pipeline.set_property(sink_property, &sink);
        }

        let result = (|| {
            let timeout = gst::ClockTime::from_seconds(5);
            pipeline
                .set_state(gst::State::Paused)
                .map_err(|e| format!("{:?}", e))?;
            pipeline.state(timeout).0.map_err(|e| format!("{:?}", e))?;

            let target = Duration::try_from_secs_f64(seconds.max(0.0))
                .ok()
                .and_then(to_clock_time)
                .ok_or("thumbnail time out of range")?;
            pipeline
                .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, target)
                .map_err(|e| e.to_string())?;
            pipeline.state(timeout).0.map_err(|e| format!("{:?}", e))?;

            let caps = gst::Caps::builder("video/x-raw")
                .field("format", "RGBA")
                .build();
            let sample = pipeline
                .emit_by_name::<Option<gst::Sample>>("convert-sample", &[&caps])
                .ok_or("no frame available")?;
            sample_to_image(&sample)
        })();

        let _ = pipeline.set_state(gst::State::Null);
        result
    }
}

fn sample_to_image(sample: &gst::Sample) -> Result<RgbaImage, String> {
    let caps = sample.caps().ok_or("sample without caps")?;
    let info = gst_video::VideoInfo::from_caps(caps).map_err(|e| e.to_string())?;
    let buffer = sample.buffer().ok_or("sample without buffer")?;
    let map = buffer.map_readable().map_err(|e| e.to_string())?;

    let (width, height) = (info.width(), info.height());
    let stride = info.stride()[0] as usize;
    let row = width as usize * 4;
    let mut pixels = Vec::with_capacity(row * height as usize);
    for line in map.as_slice().chunks(stride).take(height as usize) {
        pixels.extend_from_slice(line.get(..row).ok_or("short frame row")?);
    }
    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| "frame size mismatch".to_string())
}

impl ThumbnailSource for PlaybinFrameGrabber {
    fn grab(&self, seconds: f64, done: FrameCallback) {
        let uri = self.uri.clone();
        let spawned = std::thread::Builder::new()
            .name("playbin-thumbnail".to_string())
            .spawn(move || match Self::grab_blocking(&uri, seconds) {
                Ok(image) => done(Some(image)),
                Err(e) => {
                    warn!("PlaybinEngine: thumbnail at {:.1}s failed: {}", seconds, e);
                    done(None);
                }
            });
        if let Err(e) = spawned {
            error!("PlaybinEngine: failed to start thumbnail thread: {}", e);
        }
    }
}
