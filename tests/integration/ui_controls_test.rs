#[cfg(test)]
mod ui_controls_tests {
    use dualplay::player::{PlayerBackend, PlayerManager, StreamingInfo};
    use dualplay::ui::{
        BottomControls, ControlSlot, PLAYBACK_SPEEDS, PlaybackTimeLabel, SpeedMenu, format_time,
        streaming_info_rows,
    };
    use std::sync::Arc;

    #[test]
    fn test_time_formatting_boundaries() {
        assert_eq!(format_time(59.99), "0:59");
        assert_eq!(format_time(60.0), "1:00");
        assert_eq!(format_time(36_000.0), "10:00:00");
        assert_eq!(format_time(f64::INFINITY), "0:00");
    }

    #[test]
    fn test_idle_label() {
        let label = PlaybackTimeLabel::new(Arc::new(PlayerManager::default()));
        assert_eq!(label.text(), "0:00 • 0:00");
    }

    #[test]
    fn test_default_speed_is_selected() {
        let entries = SpeedMenu::new(Arc::new(PlayerManager::default())).entries();
        let speeds: Vec<f32> = entries.iter().map(|e| e.speed).collect();
        assert_eq!(speeds, PLAYBACK_SPEEDS.to_vec());

        let selected: Vec<_> = entries.iter().filter(|e| e.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].label, "1x");
    }

    #[test]
    fn test_bottom_controls_per_backend() {
        let gst = BottomControls::new(Arc::new(PlayerManager::new(PlayerBackend::GStreamer)));
        assert!(gst.slots().contains(&ControlSlot::Pip));

        let mpv = BottomControls::new(Arc::new(PlayerManager::new(PlayerBackend::Mpv)));
        assert!(!mpv.slots().contains(&ControlSlot::Pip));
        assert_eq!(mpv.slots().last(), Some(&ControlSlot::Seekbar));
    }

    #[test]
    fn test_streaming_rows_keep_known_values() {
        let info = StreamingInfo {
            server: Some("cdn.example.com".to_string()),
            video_codec: Some("H.264".to_string()),
            channels: Some("Stereo, 48.0kHz".to_string()),
            ..Default::default()
        };
        let rows = streaming_info_rows(&info);

        assert_eq!(rows[0], ("Server", "cdn.example.com".to_string()));
        assert!(rows.contains(&("Video codec", "H.264".to_string())));
        assert!(rows.contains(&("Channels", "Stereo, 48.0kHz".to_string())));
        assert!(rows.contains(&("Audio codec", "Unknown".to_string())));
    }
}
