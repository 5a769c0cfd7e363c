//! [`MpvEngine`] backed by libmpv.
//!
//! Playback state is derived by polling the property surface on a dedicated
//! thread, which also publishes the millisecond clock.

use image::RgbaImage;
use libmpv2::Mpv;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::engine::{MpvEngine, MpvEvent, MpvState, MpvStats, MpvTrack};
use crate::config::Config;
use crate::player::events::{Listener, Listeners, SubscriptionId};
use crate::player::thumbnail::{FrameCallback, ThumbnailSource};
use crate::player::types::{PlayerBackend, RenderSurface, TrackKind};
use crate::utils::errors::PlayerError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn track_type(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Audio => "audio",
        TrackKind::Subtitle => "sub",
        TrackKind::Video => "video",
    }
}

fn track_property(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Audio => "aid",
        TrackKind::Subtitle => "sid",
        TrackKind::Video => "vid",
    }
}

fn new_mpv() -> Result<Mpv, PlayerError> {
    let mpv =
        Mpv::new().map_err(|e| PlayerError::Engine(format!("Failed to create MPV instance: {:?}", e)))?;
    for (name, value) in [
        ("keep-open", "yes"),
        ("hwdec", "auto-safe"),
        ("osc", "no"),
        ("ytdl", "no"),
        ("load-scripts", "no"),
        ("input-default-bindings", "no"),
    ] {
        mpv.set_property(name, value)
            .map_err(|e| PlayerError::Engine(format!("Failed to set {}: {:?}", name, e)))?;
    }
    Ok(mpv)
}

struct Inner {
    mpv: Mutex<Mpv>,
    listeners: Listeners<MpvEvent>,
    media: Mutex<Option<Url>>,
    stopped: AtomicBool,
    drawable: Mutex<Option<RenderSurface>>,
}

impl Inner {
    fn get_bool(&self, name: &str) -> Option<bool> {
        self.mpv.lock().unwrap().get_property::<bool>(name).ok()
    }

    fn get_f64(&self, name: &str) -> Option<f64> {
        self.mpv.lock().unwrap().get_property::<f64>(name).ok()
    }

    fn get_i64(&self, name: &str) -> Option<i64> {
        self.mpv.lock().unwrap().get_property::<i64>(name).ok()
    }

    fn get_string(&self, name: &str) -> Option<String> {
        self.mpv
            .lock()
            .unwrap()
            .get_property::<String>(name)
            .ok()
            .filter(|s| !s.is_empty())
    }

    fn set<T: libmpv2::SetData>(&self, name: &str, value: T) {
        if let Err(e) = self.mpv.lock().unwrap().set_property(name, value) {
            warn!("LibMpvEngine: failed to set {}: {:?}", name, e);
        }
    }

    fn command(&self, name: &str, args: &[&str]) {
        if let Err(e) = self.mpv.lock().unwrap().command(name, args) {
            warn!("LibMpvEngine: {} {:?} failed: {:?}", name, args, e);
        }
    }

    fn state(&self) -> MpvState {
        if self.media.lock().unwrap().is_none() {
            return MpvState::Idle;
        }
        if self.stopped.load(Ordering::Acquire) {
            return MpvState::Stopped;
        }
        if self.get_bool("eof-reached").unwrap_or(false) {
            return MpvState::Ended;
        }
        if self.get_bool("idle-active").unwrap_or(true) {
            return MpvState::Opening;
        }
        if self.get_bool("paused-for-cache").unwrap_or(false) {
            return MpvState::Buffering;
        }
        if self.get_bool("pause").unwrap_or(true) {
            MpvState::Paused
        } else {
            MpvState::Playing
        }
    }

    fn time_ms(&self) -> i64 {
        self.get_f64("time-pos")
            .map(|s| (s * 1000.0) as i64)
            .unwrap_or(0)
    }
}

pub struct LibMpvEngine {
    inner: Arc<Inner>,
    running: Arc<AtomicBool>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LibMpvEngine {
    pub fn new(config: &Config) -> Result<Arc<Self>, PlayerError> {
        let mpv = new_mpv()?;
        if let Err(e) = mpv.set_property("speed", config.playback.default_speed as f64) {
            warn!("LibMpvEngine: failed to set initial speed: {:?}", e);
        }
        if let Ok(version) = mpv.get_property::<String>("mpv-version") {
            info!("LibMpvEngine: {}", version);
        }

        let inner = Arc::new(Inner {
            mpv: Mutex::new(mpv),
            listeners: Listeners::new(),
            media: Mutex::new(None),
            stopped: AtomicBool::new(false),
            drawable: Mutex::new(None),
        });
        let running = Arc::new(AtomicBool::new(true));

        let thread_inner = inner.clone();
        let thread_running = running.clone();
        let poll_thread = std::thread::Builder::new()
            .name("mpv-poll".to_string())
            .spawn(move || {
                debug!("LibMpvEngine: poll thread started");
                let mut last_state = MpvState::Idle;
                let mut last_time = 0;
                while thread_running.load(Ordering::Acquire) {
                    let state = thread_inner.state();
                    if state != last_state {
                        trace!("LibMpvEngine: {:?} -> {:?}", last_state, state);
                        last_state = state;
                        thread_inner.listeners.emit(&MpvEvent::StateChanged(state));
                    }
                    if matches!(state, MpvState::Playing | MpvState::Paused) {
                        let time = thread_inner.time_ms();
                        if time != last_time {
                            last_time = time;
                            thread_inner.listeners.emit(&MpvEvent::TimeChanged(time));
                        }
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                debug!("LibMpvEngine: poll thread stopped");
            })
            .map_err(|e| PlayerError::Engine(format!("Failed to start poll thread: {}", e)))?;

        Ok(Arc::new(Self {
            inner,
            running,
            poll_thread: Mutex::new(Some(poll_thread)),
        }))
    }
}

impl MpvEngine for LibMpvEngine {
    fn subscribe(&self, listener: Listener<MpvEvent>) -> SubscriptionId {
        self.inner.listeners.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.listeners.unsubscribe(id);
    }

    fn set_media(&self, url: &Url, options: &[String]) {
        info!("LibMpvEngine: loading {}", url);
        for option in options {
            let Some((key, value)) = option.split_once('=') else {
                warn!("LibMpvEngine: ignoring malformed option {}", option);
                continue;
            };
            match key {
                // Milliseconds of network cache, mpv counts seconds
                "network-caching" => match value.parse::<f64>() {
                    Ok(ms) => self.inner.set("cache-secs", ms / 1000.0),
                    Err(_) => warn!("LibMpvEngine: bad network-caching value {}", value),
                },
                _ => self.inner.set(key, value),
            }
        }

        // Start paused; playback is started explicitly once a surface exists
        self.inner.set("pause", true);
        self.inner.stopped.store(false, Ordering::Release);
        *self.inner.media.lock().unwrap() = Some(url.clone());
        self.inner.command("loadfile", &[url.as_str(), "replace"]);
    }

    fn has_media(&self) -> bool {
        self.inner.media.lock().unwrap().is_some()
    }

    fn play(&self) {
        if self.inner.stopped.swap(false, Ordering::AcqRel) {
            let media = self.inner.media.lock().unwrap().clone();
            if let Some(url) = media {
                self.inner.command("loadfile", &[url.as_str(), "replace"]);
            }
        }
        self.inner.set("pause", false);
    }

    fn pause(&self) {
        self.inner.set("pause", true);
    }

    fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.command("stop", &[]);
    }

    fn is_playing(&self) -> bool {
        self.inner.state() == MpvState::Playing
    }

    fn state(&self) -> MpvState {
        self.inner.state()
    }

    fn rate(&self) -> f32 {
        self.inner.get_f64("speed").unwrap_or(1.0) as f32
    }

    fn set_rate(&self, rate: f32) {
        self.inner.set("speed", rate as f64);
    }

    fn time_ms(&self) -> i64 {
        self.inner.time_ms()
    }

    fn length_ms(&self) -> i64 {
        self.inner
            .get_f64("duration")
            .map(|s| (s * 1000.0) as i64)
            .unwrap_or(0)
    }

    fn position(&self) -> f64 {
        self.inner.get_f64("percent-pos").unwrap_or(0.0) / 100.0
    }

    fn set_position(&self, fraction: f64) {
        let percent = format!("{:.4}", fraction.clamp(0.0, 1.0) * 100.0);
        self.inner.command("seek", &[&percent, "absolute-percent+exact"]);
    }

    fn tracks(&self, kind: TrackKind) -> Vec<MpvTrack> {
        let count = self.inner.get_i64("track-list/count").unwrap_or(0);
        (0..count)
            .filter(|i| {
                self.inner
                    .get_string(&format!("track-list/{}/type", i))
                    .is_some_and(|t| t == track_type(kind))
            })
            .map(|i| MpvTrack {
                id: self.inner.get_i64(&format!("track-list/{}/id", i)),
                title: self.inner.get_string(&format!("track-list/{}/title", i)),
                language: self.inner.get_string(&format!("track-list/{}/lang", i)),
                selected: self
                    .inner
                    .get_bool(&format!("track-list/{}/selected", i))
                    .unwrap_or(false),
            })
            .collect()
    }

    fn select_track(&self, kind: TrackKind, index: usize) {
        let tracks = self.tracks(kind);
        match tracks.get(index).and_then(|t| t.id) {
            Some(id) => self.inner.set(track_property(kind), id),
            None => warn!("LibMpvEngine: no {:?} track at {}", kind, index),
        }
    }

    fn disable_track(&self, kind: TrackKind) {
        self.inner.set(track_property(kind), "no");
    }

    fn create_surface(&self) -> RenderSurface {
        RenderSurface::allocate(PlayerBackend::Mpv)
    }

    fn set_drawable(&self, surface: RenderSurface) {
        debug!("LibMpvEngine: drawing into surface {}", surface.id);
        self.inner.set("force-window", "yes");
        *self.inner.drawable.lock().unwrap() = Some(surface);
    }

    fn has_drawable(&self) -> bool {
        self.inner.drawable.lock().unwrap().is_some()
    }

    fn set_aspect_ratio(&self, ratio: &str) {
        let value = if ratio.is_empty() { "-1" } else { ratio };
        self.inner.set("video-aspect-override", value);
    }

    fn stats(&self) -> MpvStats {
        let inner = &self.inner;
        MpvStats {
            stream_host: inner
                .media
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|u| u.host_str().map(str::to_string)),
            video_codec: inner.get_string("video-codec"),
            audio_codec: inner.get_string("audio-codec-name"),
            width: inner.get_i64("width").and_then(|w| u32::try_from(w).ok()),
            height: inner.get_i64("height").and_then(|h| u32::try_from(h).ok()),
            video_bitrate: inner.get_f64("video-bitrate"),
            audio_bitrate: inner.get_f64("audio-bitrate"),
            cache_duration: inner.get_f64("demuxer-cache-duration"),
            channels: inner.get_string("audio-params/hr-channels"),
            samplerate: inner
                .get_i64("audio-params/samplerate")
                .and_then(|r| u32::try_from(r).ok()),
        }
    }

    fn thumbnail_source(&self) -> Option<Arc<dyn ThumbnailSource>> {
        let url = self.inner.media.lock().unwrap().clone()?;
        Some(Arc::new(MpvFrameGrabber { url }))
    }
}

impl Drop for LibMpvEngine {
    fn drop(&mut self) {
        debug!("LibMpvEngine: dropping, cleaning up resources");
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.poll_thread.lock().unwrap().take()
            && thread.join().is_err()
        {
            error!("LibMpvEngine: poll thread panicked");
        }
        self.inner.listeners.clear();
        self.inner.command("stop", &[]);
    }
}

/// Decodes single frames with a private, silent mpv instance.
struct MpvFrameGrabber {
    url: Url,
}

impl MpvFrameGrabber {
    fn grab_blocking(url: &Url, seconds: f64) -> Result<RgbaImage, String> {
        let outdir: PathBuf =
            std::env::temp_dir().join(format!("dualplay-thumb-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&outdir).map_err(|e| e.to_string())?;

        let result = (|| {
            let mpv = new_mpv().map_err(|e| e.to_string())?;
            let start = format!("{:.3}", seconds.max(0.0));
            let outdir_str = outdir.to_string_lossy().to_string();
            for (name, value) in [
                ("keep-open", "no"),
                ("vo", "image"),
                ("vo-image-format", "png"),
                ("vo-image-outdir", outdir_str.as_str()),
                ("frames", "1"),
                ("aid", "no"),
                ("sid", "no"),
                ("hr-seek", "yes"),
                ("start", start.as_str()),
            ] {
                mpv.set_property(name, value)
                    .map_err(|e| format!("{}: {:?}", name, e))?;
            }
            mpv.command("loadfile", &[url.as_str(), "replace"])
                .map_err(|e| format!("loadfile: {:?}", e))?;

            let frame = outdir.join("00000001.png");
            let deadline = Instant::now() + Duration::from_secs(5);
            while !frame.exists() {
                if Instant::now() > deadline {
                    return Err("timed out waiting for frame".to_string());
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            // Let the writer finish the file
            while mpv.get_property::<bool>("idle-active").map(|idle| !idle).unwrap_or(false) {
                if Instant::now() > deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            image::open(&frame)
                .map(|img| img.to_rgba8())
                .map_err(|e| e.to_string())
        })();

        let _ = std::fs::remove_dir_all(&outdir);
        result
    }
}

impl ThumbnailSource for MpvFrameGrabber {
    fn grab(&self, seconds: f64, done: FrameCallback) {
        let url = self.url.clone();
        let spawned = std::thread::Builder::new()
            .name("mpv-thumbnail".to_string())
            .spawn(move || match Self::grab_blocking(&url, seconds) {
                Ok(image) => done(Some(image)),
                Err(e) => {
                    warn!("LibMpvEngine: thumbnail at {:.1}s failed: {}", seconds, e);
                    done(None);
                }
            });
        if let Err(e) = spawned {
            error!("LibMpvEngine: failed to start thumbnail thread: {}", e);
        }
    }
}
