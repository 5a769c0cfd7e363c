#[cfg(test)]
mod config_tests {
    use crate::common::TestContext;
    use dualplay::config::Config;
    use dualplay::player::PlayerBackend;

    #[test]
    fn test_config_round_trip() {
        let ctx = TestContext::new();
        let mut config = Config::default();
        config.playback.player_backend = "mpv".to_string();
        config.playback.default_speed = 1.5;
        config.playback.network_caching_ms = 2500;
        config.display.screen_width = 2560;
        config.display.screen_height = 1440;
        config.thumbnails.max_width = 200;

        config.save_to(&ctx.config_path).unwrap();
        let loaded = ctx.load();

        assert_eq!(loaded, config);
        assert_eq!(loaded.backend(), PlayerBackend::Mpv);
    }

    #[test]
    fn test_first_load_creates_file_with_defaults() {
        let ctx = TestContext::new();
        assert!(!ctx.config_path.exists());

        let config = ctx.load();
        assert!(ctx.config_path.exists());
        assert_eq!(config.backend(), PlayerBackend::GStreamer);
        assert_eq!(config.thumbnails.timeout_ms, 5000);

        let contents = std::fs::read_to_string(&ctx.config_path).unwrap();
        assert!(contents.contains("[playback]"));
        assert!(contents.contains("player_backend = \"gstreamer\""));
    }

    #[test]
    fn test_unknown_backend_falls_back_to_gstreamer() {
        let ctx = TestContext::new();
        ctx.write_config("[playback]\nplayer_backend = \"vlc\"\n");
        assert_eq!(ctx.load().backend(), PlayerBackend::GStreamer);
    }

    #[test]
    fn test_display_section_only() {
        let ctx = TestContext::new();
        ctx.write_config("[display]\nscreen_width = 1280\nscreen_height = 720\n");

        let config = ctx.load();
        assert_eq!(config.display.screen_width, 1280);
        assert_eq!(config.display.screen_height, 720);
        assert_eq!(config.playback.start_delay_ms, 100);
    }
}
