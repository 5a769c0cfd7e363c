#[cfg(test)]
mod property_tests {
    use dualplay::core::viewmodels::Property;
    use dualplay::player::{PlayerBackend, PlayerManager};

    #[test]
    fn test_property_exposes_initial_value() {
        let property = Property::new(42u32, "answer");
        assert_eq!(property.get(), 42);
        assert_eq!(property.name(), "answer");
        assert_eq!(*property.watch().borrow(), 42);
    }

    #[test]
    fn test_subscribers_are_counted() {
        let property = Property::new(String::new(), "title");
        assert_eq!(property.debug_subscribers(), 0);

        let first = property.subscribe();
        let mut second = property.subscribe();
        assert_eq!(property.debug_subscribers(), 2);
        assert!(!second.try_recv());

        drop(first);
        assert_eq!(property.debug_subscribers(), 1);
    }

    #[test]
    fn test_fresh_manager_snapshot() {
        let manager = PlayerManager::new(PlayerBackend::Mpv);
        let state = manager.snapshot();

        assert_eq!(state.selected_backend, PlayerBackend::Mpv);
        assert_eq!(state.current_time, 0.0);
        assert_eq!(state.playback_speed, 1.0);
        assert!(!state.is_playing);
        assert!(!state.is_media_ready);
        assert!(state.audio_tracks.is_empty());
        assert!(state.selected_subtitle_track.is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let manager = PlayerManager::default();
        let json = serde_json::to_value(manager.snapshot()).unwrap();
        assert_eq!(json["selected_backend"], "gstreamer");
        assert_eq!(json["is_seeking"], false);
    }
}
