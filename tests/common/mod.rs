use dualplay::config::Config;
use std::path::PathBuf;
use tempfile::TempDir;

/// Scratch directory holding a config file for one test.
pub struct TestContext {
    pub config_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("dualplay").join("config.toml");
        Self {
            config_path,
            _temp_dir: temp_dir,
        }
    }

    pub fn write_config(&self, contents: &str) {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create config dir");
        }
        std::fs::write(&self.config_path, contents).expect("Failed to write config");
    }

    pub fn load(&self) -> Config {
        Config::load_from(&self.config_path).expect("Failed to load config")
    }
}
