use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use super::events::SubscriptionId;
use super::manager::ManagerSink;
use super::mpv::engine::{MpvEngine, MpvEvent, MpvState, MpvTrack};
use super::thumbnail::ThumbnailGenerator;
use super::traits::{
    GestureHandling, MediaLoading, MediaPlayer, PlaybackControl, StreamingInfoReporting,
    ThumbnailGeneration, TimeControl, TrackSelection, ViewRendering,
};
use super::types::{
    PlayerBackend, RenderSurface, SeekCompletion, StreamingInfo, ThumbnailCompletion, TrackInfo,
    TrackKind, TrackSelector, clamp_seek_target,
};
use crate::config::Config;

const TRACK_KINDS: [TrackKind; 3] = [TrackKind::Audio, TrackKind::Subtitle, TrackKind::Video];

/// State reachable from engine callbacks. Never holds the adapter itself.
struct Shared {
    engine: Weak<dyn MpvEngine>,
    sink: ManagerSink,
    tracks: Mutex<HashMap<TrackKind, Vec<TrackInfo>>>,
    pending_resume: Mutex<Option<f64>>,
    torn_down: AtomicBool,
}

pub struct MpvPlayer {
    engine: Arc<dyn MpvEngine>,
    shared: Arc<Shared>,
    subscription: Mutex<Option<SubscriptionId>>,
    view: Mutex<Option<RenderSurface>>,
    start_task: Mutex<Option<JoinHandle<()>>>,
    thumbnails: ThumbnailGenerator,
    network_caching_ms: u64,
    start_delay: Duration,
    screen_size: (u32, u32),
}

impl MpvPlayer {
    pub fn new(engine: Arc<dyn MpvEngine>, sink: ManagerSink, config: &Config) -> Self {
        info!(
            "Initializing MPV player (network caching: {}ms, start delay: {}ms)",
            config.playback.network_caching_ms, config.playback.start_delay_ms
        );

        let shared = Arc::new(Shared {
            engine: Arc::downgrade(&engine),
            sink,
            tracks: Mutex::new(HashMap::new()),
            pending_resume: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        });

        let handler_state = shared.clone();
        let subscription = engine.subscribe(Box::new(move |event| {
            handler_state.handle_event(event);
        }));

        let speed = config.playback.default_speed;
        if speed != 1.0 {
            engine.set_rate(speed);
            shared.sink.apply(move |m| m.set_playback_speed(speed));
        }

        Self {
            engine,
            shared,
            subscription: Mutex::new(Some(subscription)),
            view: Mutex::new(None),
            start_task: Mutex::new(None),
            thumbnails: ThumbnailGenerator::new("MpvPlayer", config.thumbnails.max_width),
            network_caching_ms: config.playback.network_caching_ms,
            start_delay: Duration::from_millis(config.playback.start_delay_ms),
            screen_size: (config.display.screen_width, config.display.screen_height),
        }
    }

    fn cancel_start(&self) {
        if let Some(task) = self.start_task.lock().unwrap().take() {
            task.abort();
        }
    }

    fn current_track(&self, kind: TrackKind) -> Option<TrackInfo> {
        let raw = self.engine.tracks(kind);
        let index = raw.iter().position(|t| t.selected)?;
        self.shared
            .tracks_for(self.engine.as_ref(), kind)
            .into_iter()
            .nth(index)
    }

    fn select(&self, kind: TrackKind, selector: &TrackSelector) {
        let tracks = self.shared.tracks_for(self.engine.as_ref(), kind);
        let Some(index) = selector.resolve(&tracks) else {
            warn!("MpvPlayer: no {:?} track matches {:?}", kind, selector);
            return;
        };
        debug!("MpvPlayer: selecting {:?} track {}", kind, tracks[index].name);
        self.engine.select_track(kind, index);
        self.publish_selection();
    }

    fn publish_selection(&self) {
        let audio = self.current_track(TrackKind::Audio);
        let subtitle = self.current_track(TrackKind::Subtitle);
        self.shared
            .sink
            .apply(move |m| m.set_selected_tracks(audio, subtitle));
    }

    /// Seconds buffered from the start of the item.
    fn buffered_seconds(&self) -> f64 {
        let current = self.current_time();
        match self.engine.stats().cache_duration {
            Some(ahead) if ahead.is_finite() && ahead >= 0.0 => current + ahead,
            _ => self.duration() * self.engine.position().clamp(0.0, 1.0),
        }
    }
}

impl Shared {
    fn handle_event(&self, event: &MpvEvent) {
        if self.torn_down.load(Ordering::Acquire) {
            trace!("MpvPlayer: ignoring {:?} after teardown", event);
            return;
        }

        match event {
            MpvEvent::StateChanged(state) => {
                trace!("MpvPlayer: state changed to {:?}", state);
                let playing = *state == MpvState::Playing;
                let buffering = *state == MpvState::Buffering;
                self.sink.apply(move |m| {
                    m.set_playing(playing);
                    m.set_buffering(buffering);
                });

                match state {
                    MpvState::Playing | MpvState::Buffering => self.refresh_media_info(),
                    MpvState::Ended => self.sink.apply(|m| m.video_did_end()),
                    MpvState::Error => {
                        warn!("MpvPlayer: engine reported a playback error");
                        self.sink.apply(|m| m.set_media_ready(false));
                    }
                    _ => {}
                }
            }
            MpvEvent::TimeChanged(ms) => {
                let seconds = *ms as f64 / 1000.0;
                self.sink.apply(move |m| m.set_current_time(seconds));
            }
        }
    }

    fn refresh_media_info(&self) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };

        let [audio, subtitles, video] =
            TRACK_KINDS.map(|kind| self.refresh_tracks(engine.as_ref(), kind));
        let selected_audio = selected_descriptor(engine.as_ref(), TrackKind::Audio, &audio);
        let selected_subtitle =
            selected_descriptor(engine.as_ref(), TrackKind::Subtitle, &subtitles);
        let duration = engine.length_ms().max(0) as f64 / 1000.0;

        self.sink.apply(move |m| {
            m.set_media_ready(true);
            m.set_duration(duration);
            m.update_track_info(audio, subtitles, video);
            m.set_selected_tracks(selected_audio, selected_subtitle);
        });

        // The resume seek needs a known length to turn into a position
        let length_ms = engine.length_ms();
        let resume = if length_ms > 0 {
            self.pending_resume.lock().unwrap().take()
        } else {
            None
        };
        if let Some(position) = resume {
            let length = length_ms as f64 / 1000.0;
            let target = clamp_seek_target(position, length);
            debug!("MpvPlayer: resuming at {:.1}s", target);
            engine.set_position(target / length);
            self.sink.apply(move |m| m.set_current_time(target));
        }
    }

    /// Rebuild one track list from the engine, keeping synthesized ids by position.
    fn refresh_tracks(&self, engine: &dyn MpvEngine, kind: TrackKind) -> Vec<TrackInfo> {
        let raw = engine.tracks(kind);
        let mut cache = self.tracks.lock().unwrap();
        let previous = cache.get(&kind).map(Vec::as_slice);
        let tracks = describe_tracks(kind, &raw, previous);
        cache.insert(kind, tracks.clone());
        tracks
    }

    fn tracks_for(&self, engine: &dyn MpvEngine, kind: TrackKind) -> Vec<TrackInfo> {
        if !engine.has_media() {
            return Vec::new();
        }
        if let Some(tracks) = self.tracks.lock().unwrap().get(&kind) {
            return tracks.clone();
        }
        self.refresh_tracks(engine, kind)
    }
}

fn describe_tracks(
    kind: TrackKind,
    raw: &[MpvTrack],
    previous: Option<&[TrackInfo]>,
) -> Vec<TrackInfo> {
    raw.iter()
        .enumerate()
        .map(|(position, track)| {
            let id = match track.id {
                Some(id) => id.to_string(),
                None => previous
                    .and_then(|p| p.get(position))
                    .filter(|t| Uuid::parse_str(&t.id).is_ok())
                    .map(|t| t.id.clone())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            };
            TrackInfo::new(
                kind,
                id,
                track.display_name(kind, position),
                track.language.clone(),
            )
        })
        .collect()
}

fn selected_descriptor(
    engine: &dyn MpvEngine,
    kind: TrackKind,
    tracks: &[TrackInfo],
) -> Option<TrackInfo> {
    let index = engine.tracks(kind).iter().position(|t| t.selected)?;
    tracks.get(index).cloned()
}

/// Reduced `W:H` ratio of a screen, or the empty string for the engine default.
pub fn aspect_ratio_string(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 { a } else { gcd(b, a % b) }
    }

    if width == 0 || height == 0 {
        return String::new();
    }
    let divisor = gcd(width, height);
    format!("{}:{}", width / divisor, height / divisor)
}

impl PlaybackControl for MpvPlayer {
    fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    fn playback_speed(&self) -> f32 {
        self.engine.rate()
    }

    fn set_playback_speed(&self, speed: f32) {
        if !speed.is_finite() || speed <= 0.0 {
            warn!("MpvPlayer: ignoring invalid playback speed {}", speed);
            return;
        }
        self.engine.set_rate(speed);
        self.shared.sink.apply(move |m| m.set_playback_speed(speed));
        debug!("MpvPlayer: playback speed set to {}", speed);
    }

    fn play(&self) {
        debug!("MpvPlayer: play");
        self.engine.play();
    }

    fn pause(&self) {
        debug!("MpvPlayer: pause");
        self.engine.pause();
    }

    fn stop(&self) {
        debug!("MpvPlayer: stop");
        self.cancel_start();
        self.engine.stop();
    }
}

impl TimeControl for MpvPlayer {
    fn current_time(&self) -> f64 {
        self.engine.time_ms() as f64 / 1000.0
    }

    fn duration(&self) -> f64 {
        self.engine.length_ms().max(0) as f64 / 1000.0
    }

    fn buffered_duration(&self) -> f64 {
        self.buffered_seconds()
    }

    fn is_buffering(&self) -> bool {
        self.engine.state() == MpvState::Buffering
    }

    fn seek(&self, seconds: f64) -> SeekCompletion {
        let (sender, completion) = oneshot::channel();

        let duration = self.duration();
        if duration <= 0.0 {
            warn!("MpvPlayer: cannot seek while the media length is unknown");
            let _ = sender.send(false);
            return completion;
        }

        let target = clamp_seek_target(seconds, duration);
        debug!("MpvPlayer: seek to {:.3}s of {:.3}s", target, duration);
        self.shared.sink.apply(move |m| m.begin_seek(target));
        self.engine.set_position(target / duration);
        self.shared.sink.apply(move |m| {
            m.end_seek();
            m.set_current_time(target);
        });

        // Position changes take effect immediately
        let _ = sender.send(true);
        completion
    }
}

impl TrackSelection for MpvPlayer {
    fn audio_tracks(&self) -> Vec<TrackInfo> {
        self.shared
            .tracks_for(self.engine.as_ref(), TrackKind::Audio)
    }

    fn subtitle_tracks(&self) -> Vec<TrackInfo> {
        self.shared
            .tracks_for(self.engine.as_ref(), TrackKind::Subtitle)
    }

    fn video_tracks(&self) -> Vec<TrackInfo> {
        self.shared
            .tracks_for(self.engine.as_ref(), TrackKind::Video)
    }

    fn current_audio_track(&self) -> Option<TrackInfo> {
        self.current_track(TrackKind::Audio)
    }

    fn current_subtitle_track(&self) -> Option<TrackInfo> {
        self.current_track(TrackKind::Subtitle)
    }

    fn select_audio_track(&self, selector: &TrackSelector) {
        self.select(TrackKind::Audio, selector);
    }

    fn select_subtitle_track(&self, selector: Option<&TrackSelector>) {
        match selector {
            Some(selector) => self.select(TrackKind::Subtitle, selector),
            None => {
                debug!("MpvPlayer: disabling subtitles");
                self.engine.disable_track(TrackKind::Subtitle);
                self.publish_selection();
            }
        }
    }

    fn select_video_track(&self, selector: &TrackSelector) {
        self.select(TrackKind::Video, selector);
    }
}

#[async_trait]
impl MediaLoading for MpvPlayer {
    async fn load(&self, url: &Url, resume_position: Option<f64>) {
        info!("MpvPlayer: loading media {}", url);

        self.cancel_start();
        self.shared.tracks.lock().unwrap().clear();
        self.thumbnails.reset();
        *self.shared.pending_resume.lock().unwrap() =
            resume_position.filter(|p| p.is_finite() && *p > 0.0);
        self.shared.sink.apply(|m| m.reset_for_new_item());

        let options = vec![format!("network-caching={}", self.network_caching_ms)];
        self.engine.set_media(url, &options);

        // Give the surface a moment to attach before starting playback
        let engine = Arc::downgrade(&self.engine);
        let delay = self.start_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if engine.has_drawable() {
                info!("MpvPlayer: starting playback with drawable set");
                engine.play();
            } else {
                warn!("MpvPlayer: drawable still missing after start delay, waiting for play");
            }
        });
        *self.start_task.lock().unwrap() = Some(task);
    }
}

impl ViewRendering for MpvPlayer {
    fn player_view(&self) -> RenderSurface {
        let mut view = self.view.lock().unwrap();
        if let Some(surface) = *view {
            return surface;
        }
        let surface = self.engine.create_surface();
        self.engine.set_drawable(surface);
        debug!("MpvPlayer: created render surface {}", surface.id);
        *view = Some(surface);
        surface
    }

    fn setup_pip(&self) {
        debug!("MpvPlayer: PiP is not available, setup skipped");
    }

    fn start_pip(&self) {
        warn!("MpvPlayer: PiP is not supported by this backend");
    }

    fn stop_pip(&self) {
        debug!("MpvPlayer: PiP is not available, nothing to stop");
    }
}

impl ThumbnailGeneration for MpvPlayer {
    fn generate_thumbnail(&self, seconds: f64) -> ThumbnailCompletion {
        let engine = &self.engine;
        self.thumbnails.generate(seconds, || {
            if engine.has_media() {
                engine.thumbnail_source()
            } else {
                None
            }
        })
    }
}

impl GestureHandling for MpvPlayer {
    fn handle_pinch(&self, scale: f64) {
        let ratio = if scale > 1.0 {
            aspect_ratio_string(self.screen_size.0, self.screen_size.1)
        } else {
            String::new()
        };
        debug!("MpvPlayer: new aspect ratio {:?}", ratio);
        self.engine.set_aspect_ratio(&ratio);
    }
}

impl StreamingInfoReporting for MpvPlayer {
    fn streaming_info(&self) -> StreamingInfo {
        if !self.engine.has_media() {
            return StreamingInfo::placeholder();
        }

        let stats = self.engine.stats();
        let channels = match (stats.channels.clone(), stats.samplerate) {
            (Some(layout), Some(rate)) => Some(format!("{}, {:.1}kHz", layout, rate as f64 / 1000.0)),
            (layout, _) => layout,
        };

        StreamingInfo {
            server: stats.stream_host.clone(),
            bitrates: stats.video_bitrate.into_iter().collect(),
            observed_bitrate: None,
            buffer_duration: stats.cache_duration,
            video_codec: stats.video_codec.clone(),
            audio_codec: stats.audio_codec.clone(),
            resolution: stats.width.zip(stats.height).filter(|(w, h)| *w > 0 && *h > 0),
            video_bitrate: stats.video_bitrate,
            track_name: self.current_audio_track().map(|t| t.name),
            channels,
        }
    }
}

impl MediaPlayer for MpvPlayer {
    fn backend(&self) -> PlayerBackend {
        PlayerBackend::Mpv
    }

    fn teardown(&self) {
        if self.shared.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_start();
        if let Some(id) = self.subscription.lock().unwrap().take() {
            self.engine.unsubscribe(id);
        }
        self.thumbnails.reset();
        debug!("MpvPlayer: detached from engine");
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        debug!("MpvPlayer - Dropping player");
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::dispatch::UiLoop;
    use crate::player::manager::PlayerManager;
    use crate::test_utils::{FakeMpvEngine, FakeThumbnailSource, active_sink};

    fn track(id: Option<i64>, title: &str, lang: Option<&str>) -> MpvTrack {
        MpvTrack {
            id,
            title: Some(title.to_string()),
            language: lang.map(str::to_string),
            selected: false,
        }
    }

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.playback.start_delay_ms = 10;
        config
    }

    fn setup_with(config: &Config) -> (Arc<FakeMpvEngine>, MpvPlayer, Arc<PlayerManager>, UiLoop) {
        let engine = FakeMpvEngine::new();
        let (manager, sink, ui_loop) = active_sink(PlayerBackend::Mpv);
        let player = MpvPlayer::new(engine.clone(), sink, config);
        (engine, player, manager, ui_loop)
    }

    fn setup() -> (Arc<FakeMpvEngine>, MpvPlayer, Arc<PlayerManager>, UiLoop) {
        setup_with(&quick_config())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_aspect_ratio_string() {
        assert_eq!(aspect_ratio_string(1920, 1080), "16:9");
        assert_eq!(aspect_ratio_string(2532, 1170), "422:195");
        assert_eq!(aspect_ratio_string(1000, 1000), "1:1");
        assert_eq!(aspect_ratio_string(0, 1080), "");
    }

    #[test]
    fn test_tracks_empty_before_load() {
        let (engine, player, _manager, _ui) = setup();
        engine.set_tracks(TrackKind::Audio, vec![track(Some(1), "English", Some("en"))]);

        assert!(player.audio_tracks().is_empty());
        assert!(player.subtitle_tracks().is_empty());
        assert!(player.video_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_load_passes_network_caching_option() {
        let (engine, player, _manager, _ui) = setup();
        player.load(&url("https://example.com/live.ts"), None).await;

        let (loaded, options) = engine.last_media().expect("media set");
        assert_eq!(loaded.as_str(), "https://example.com/live.ts");
        assert_eq!(options, vec!["network-caching=1000".to_string()]);
    }

    #[tokio::test]
    async fn test_playback_starts_after_delay_with_drawable() {
        let (engine, player, _manager, _ui) = setup();
        player.player_view();
        player.load(&url("file:///tmp/movie.mkv"), None).await;
        assert_eq!(engine.play_count(), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.play_count(), 1);
    }

    #[tokio::test]
    async fn test_playback_waits_without_drawable() {
        let (engine, player, _manager, _ui) = setup();
        player.load(&url("file:///tmp/movie.mkv"), None).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.play_count(), 0);
    }

    #[tokio::test]
    async fn test_seek_uses_position_fraction() {
        let (engine, player, manager, mut ui) = setup();
        player.load(&url("file:///tmp/movie.mkv"), None).await;
        engine.set_length_ms(200_000);

        assert!(player.seek(50.0).await.unwrap());
        assert_eq!(engine.positions(), vec![0.25]);
        ui.run_pending();
        assert!(!manager.is_seeking().get());
        assert_eq!(manager.current_time().get(), 50.0);
    }

    #[tokio::test]
    async fn test_seek_is_clamped_into_duration() {
        let (engine, player, _manager, _ui) = setup();
        player.load(&url("file:///tmp/movie.mkv"), None).await;
        engine.set_length_ms(100_000);

        assert!(player.seek(-10.0).await.unwrap());
        assert!(player.seek(250.0).await.unwrap());
        assert_eq!(engine.positions(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_seek_with_unknown_length_fails() {
        let (engine, player, _manager, _ui) = setup();
        player.load(&url("https://example.com/live.ts"), None).await;

        assert!(!player.seek(30.0).await.unwrap());
        assert!(engine.positions().is_empty());
    }

    #[tokio::test]
    async fn test_state_change_refreshes_tracks() {
        let (engine, player, manager, mut ui) = setup();
        engine.set_tracks(
            TrackKind::Audio,
            vec![
                track(Some(1), "English", Some("en")),
                track(Some(2), "Deutsch", Some("de")),
            ],
        );
        engine.set_tracks(TrackKind::Subtitle, vec![track(None, "Forced", None)]);
        engine.set_tracks(TrackKind::Video, vec![track(Some(1), "Main", None)]);
        player.load(&url("file:///tmp/movie.mkv"), None).await;

        engine.emit(MpvEvent::StateChanged(MpvState::Opening));
        ui.run_pending();
        assert!(manager.audio_tracks().get().is_empty());

        engine.emit(MpvEvent::StateChanged(MpvState::Playing));
        ui.run_pending();
        let state = manager.snapshot();
        assert!(state.is_playing);
        assert!(state.is_media_ready);
        assert_eq!(state.audio_tracks.len(), 2);
        assert_eq!(state.audio_tracks[1].id, "2");
        assert_eq!(state.video_tracks.len(), 1);

        // Synthesized ids survive later refreshes
        let subtitle_id = state.subtitle_tracks[0].id.clone();
        assert!(Uuid::parse_str(&subtitle_id).is_ok());
        engine.emit(MpvEvent::StateChanged(MpvState::Buffering));
        ui.run_pending();
        assert_eq!(manager.subtitle_tracks().get()[0].id, subtitle_id);
        assert!(manager.is_buffering().get());
        assert_eq!(player.subtitle_tracks()[0].id, subtitle_id);
    }

    #[tokio::test]
    async fn test_select_tracks_by_id_and_index() {
        let (engine, player, manager, mut ui) = setup();
        engine.set_tracks(
            TrackKind::Audio,
            vec![
                track(Some(1), "English", Some("en")),
                track(Some(2), "Deutsch", Some("de")),
            ],
        );
        engine.set_tracks(TrackKind::Subtitle, vec![track(Some(3), "English", Some("en"))]);
        player.load(&url("file:///tmp/movie.mkv"), None).await;

        player.select_audio_track(&TrackSelector::from("2"));
        assert_eq!(engine.selected_index(TrackKind::Audio), Some(1));
        assert_eq!(player.current_audio_track().map(|t| t.name), Some("Deutsch".into()));

        player.select_subtitle_track(Some(&TrackSelector::from(0usize)));
        assert_eq!(engine.selected_index(TrackKind::Subtitle), Some(0));

        player.select_subtitle_track(None);
        assert_eq!(engine.selected_index(TrackKind::Subtitle), None);

        // Out of range selections are ignored
        player.select_audio_track(&TrackSelector::from(9usize));
        assert_eq!(engine.selected_index(TrackKind::Audio), Some(1));

        ui.run_pending();
        assert_eq!(
            manager.selected_audio_track().get().map(|t| t.id),
            Some("2".to_string())
        );
        assert!(manager.selected_subtitle_track().get().is_none());
    }

    #[tokio::test]
    async fn test_time_change_in_milliseconds() {
        let (engine, _player, manager, mut ui) = setup();
        engine.emit(MpvEvent::TimeChanged(12_345));
        ui.run_pending();
        assert_eq!(manager.current_time().get(), 12.345);
    }

    #[tokio::test]
    async fn test_resume_applied_on_first_playing_state() {
        let (engine, player, manager, mut ui) = setup();
        player
            .load(&url("https://example.com/a.mkv"), Some(30.0))
            .await;
        engine.set_length_ms(120_000);

        engine.emit(MpvEvent::StateChanged(MpvState::Playing));
        assert_eq!(engine.positions(), vec![0.25]);
        ui.run_pending();
        assert_eq!(manager.current_time().get(), 30.0);

        // Only once per item
        engine.emit(MpvEvent::StateChanged(MpvState::Playing));
        assert_eq!(engine.positions().len(), 1);

        player.load(&url("https://example.com/b.mkv"), None).await;
        ui.run_pending();
        assert_eq!(manager.current_time().get(), 0.0);
    }

    #[tokio::test]
    async fn test_ended_state_marks_did_end() {
        let (engine, _player, manager, mut ui) = setup();
        engine.emit(MpvEvent::StateChanged(MpvState::Playing));
        engine.emit(MpvEvent::StateChanged(MpvState::Ended));
        ui.run_pending();
        assert!(manager.did_end().get());
        assert!(!manager.is_playing().get());
    }

    #[test]
    fn test_pinch_sets_aspect_ratio() {
        let mut config = quick_config();
        config.display.screen_width = 2532;
        config.display.screen_height = 1170;
        let (engine, player, _manager, _ui) = setup_with(&config);

        player.handle_pinch(1.4);
        assert_eq!(engine.aspect_ratio(), Some("422:195".to_string()));
        player.handle_pinch(0.9);
        assert_eq!(engine.aspect_ratio(), Some(String::new()));
    }

    #[test]
    fn test_pip_calls_are_noops() {
        let (engine, player, manager, mut ui) = setup();
        player.setup_pip();
        player.start_pip();
        player.stop_pip();
        ui.run_pending();
        assert!(!manager.is_pip_active().get());
        assert_eq!(engine.surfaces_created(), 0);
    }

    #[test]
    fn test_view_is_cached_and_becomes_drawable() {
        let (engine, player, _manager, _ui) = setup();
        assert!(!engine.has_drawable());
        let first = player.player_view();
        assert_eq!(player.player_view(), first);
        assert_eq!(engine.surfaces_created(), 1);
        assert!(engine.has_drawable());
    }

    #[tokio::test]
    async fn test_teardown_unsubscribes_and_cancels_start() {
        let (engine, player, manager, mut ui) = setup();
        player.player_view();
        player.load(&url("file:///tmp/movie.mkv"), None).await;
        player.teardown();
        assert_eq!(engine.listener_count(), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.play_count(), 0);

        engine.emit(MpvEvent::TimeChanged(5_000));
        ui.run_pending();
        assert_eq!(manager.current_time().get(), 0.0);
    }

    #[tokio::test]
    async fn test_thumbnail_requires_media() {
        let (engine, player, _manager, _ui) = setup();
        engine.set_thumbnail_source(FakeThumbnailSource::immediate(4, 4));
        assert_eq!(player.generate_thumbnail(1.0).await.unwrap(), None);

        player.load(&url("file:///tmp/movie.mkv"), None).await;
        assert!(player.generate_thumbnail(1.0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_streaming_info_from_stats() {
        use crate::player::mpv::engine::MpvStats;

        let (engine, player, _manager, _ui) = setup();
        assert!(player.streaming_info().is_placeholder());

        player.load(&url("https://cdn.example.com/a.mkv"), None).await;
        engine.set_stats(MpvStats {
            stream_host: Some("cdn.example.com".into()),
            video_codec: Some("hevc".into()),
            audio_codec: Some("aac".into()),
            width: Some(3840),
            height: Some(2160),
            video_bitrate: Some(12_000_000.0),
            channels: Some("5.1".into()),
            samplerate: Some(48_000),
            ..Default::default()
        });

        let info = player.streaming_info();
        assert_eq!(info.server.as_deref(), Some("cdn.example.com"));
        assert_eq!(info.resolution, Some((3840, 2160)));
        assert_eq!(info.bitrates, vec![12_000_000.0]);
        assert_eq!(info.channels.as_deref(), Some("5.1, 48.0kHz"));
        assert_eq!(info.buffer_duration, None);
        assert_eq!(info.observed_bitrate, None);
    }

    #[test]
    fn test_default_speed_applied_at_construction() {
        let mut config = quick_config();
        config.playback.default_speed = 1.25;
        let (engine, player, manager, mut ui) = setup_with(&config);
        assert_eq!(engine.rate(), 1.25);
        assert_eq!(player.playback_speed(), 1.25);
        ui.run_pending();
        assert_eq!(manager.playback_speed().get(), 1.25);
    }
}
