use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, error, info, trace};

use super::engine::{AccessLogEvent, GstEvent, TimeControlStatus};
use super::playbin::{BusShared, SEEK_FAILED_MESSAGE, clock_to_seconds};

/// Translate one bus message into engine state and [`GstEvent`]s.
pub(super) fn handle_bus_message(msg: &gst::Message, playbin: &gst::Element, shared: &BusShared) {
    use gst::MessageView;

    let msg_type = msg.type_();
    if !matches!(
        msg_type,
        gst::MessageType::Qos | gst::MessageType::Progress | gst::MessageType::StreamStatus
    ) {
        let src_name = msg
            .src()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        trace!("Bus message: {:?} from {}", msg_type, src_name);
    }

    match msg.view() {
        MessageView::Eos(_) => {
            info!("PlaybinEngine: end of stream");
            shared.set_want_playing(false);
            shared.set_status(TimeControlStatus::Paused);
            shared.listeners.emit(&GstEvent::PlaybackEnded);
        }
        MessageView::Error(err) => {
            error!(
                "PlaybinEngine: bus error from {:?}: {} ({:?})",
                err.src().map(|s| s.path_string()),
                err.error(),
                err.debug()
            );
            shared.fail_pending_seek();
            if shared.awaiting_preroll() {
                shared.finish_preroll();
                shared
                    .listeners
                    .emit(&GstEvent::ItemFailed(err.error().to_string()));
            }
        }
        MessageView::StateChanged(state_changed) => {
            // Only the pipeline's own transitions drive the status
            if state_changed.src() != Some(playbin.upcast_ref::<gst::Object>()) {
                return;
            }
            let new_state = state_changed.current();
            debug!(
                "PlaybinEngine: state changed from {:?} to {:?}",
                state_changed.old(),
                new_state
            );
            let status = match new_state {
                gst::State::Playing => TimeControlStatus::Playing,
                _ if shared.want_playing() => TimeControlStatus::WaitingToPlay,
                _ => TimeControlStatus::Paused,
            };
            shared.set_status(status);
        }
        MessageView::Buffering(buffering) => {
            let percent = buffering.percent();
            debug!("PlaybinEngine: buffering {}%", percent);
            if !shared.want_playing() {
                return;
            }
            if percent < 100 {
                shared.set_status(TimeControlStatus::WaitingToPlay);
                let _ = playbin.set_state(gst::State::Paused);
            } else {
                let _ = playbin.set_state(gst::State::Playing);
            }
        }
        MessageView::AsyncDone(_) => {
            // Taken first so a seek issued from an ItemReady listener is not
            // resolved by this same message
            let pending_seek = shared.take_pending_seek();

            if shared.awaiting_preroll() {
                shared.finish_preroll();
                info!("PlaybinEngine: item prerolled");
                if let Some(duration) = playbin.query_duration::<gst::ClockTime>() {
                    shared
                        .listeners
                        .emit(&GstEvent::DurationChanged(clock_to_seconds(duration)));
                }
                shared.listeners.emit(&GstEvent::ItemReady);
            }

            if let Some(done) = pending_seek {
                debug!("PlaybinEngine: seek finished");
                done(true);
            }
        }
        MessageView::DurationChanged(_) => {
            if let Some(duration) = playbin.query_duration::<gst::ClockTime>() {
                shared
                    .listeners
                    .emit(&GstEvent::DurationChanged(clock_to_seconds(duration)));
            }
        }
        MessageView::Tag(tag_msg) => {
            let tags = tag_msg.tags();
            if let Some(lang) = tags.get::<gst::tags::LanguageCode>() {
                trace!("Found language tag: {}", lang.get());
            }
            let bitrate = tags
                .get::<gst::tags::Bitrate>()
                .map(|b| b.get())
                .or_else(|| tags.get::<gst::tags::NominalBitrate>().map(|b| b.get()));
            if let Some(bitrate) = bitrate.filter(|b| *b > 0) {
                shared.record_access(AccessLogEvent {
                    indicated_bitrate: Some(bitrate as f64),
                    observed_bitrate: None,
                    server_address: shared.server_address(),
                });
            }
        }
        MessageView::Application(app) => {
            if app
                .structure()
                .is_some_and(|s| s.name() == SEEK_FAILED_MESSAGE)
            {
                shared.fail_pending_seek();
            }
        }
        _ => {}
    }
}
