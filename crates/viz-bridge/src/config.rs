//! Configuration file management.
//!
//! Handles loading user preferences from `~/.viz-bridge.toml`.

use crate::shm::DEFAULT_SHM_NAME;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_PLUGINS_DIR: &str = "components";

const CONFIG_TEMPLATE: &str = r#"# viz-bridge configuration file

# Directory scanned for component plugins (default: "components")
# plugins_dir = "/path/to/components"

# Name of the shared-memory region published by the host's audio engine
# shm_name = "VizBridge_AudioSHM"
"#;

#[derive(Deserialize, Default)]
pub struct Config {
    pub plugins_dir: Option<String>,
    pub shm_name: Option<String>,
}

impl Config {
    fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".viz-bridge.toml"))
    }

    pub fn load() -> Self {
        let path = match Self::path() {
            Some(p) => p,
            None => return Self::default(),
        };

        // Create template file if it doesn't exist
        if !path.exists() {
            let _ = fs::write(&path, CONFIG_TEMPLATE);
            info!("Created config template at {:?}", path);
        }

        fs::read_to_string(&path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGINS_DIR))
    }

    pub fn shm_name(&self) -> String {
        self.shm_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SHM_NAME.to_string())
    }
}
