use log::warn;
use nescaster_core::{RunAheadConfig, TimingBase};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_REPORT_EVERY: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CliConfig {
    pub region: TimingBase,
    /// Simulated CPU cost of one emulated frame, in microseconds.
    pub frame_cost_us: u64,
    /// Frames between progress reports. Zero only reports at the end.
    pub report_every: u32,
    pub run_ahead: RunAheadConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            region: TimingBase::default(),
            frame_cost_us: 0,
            report_every: DEFAULT_REPORT_EVERY,
            run_ahead: RunAheadConfig::default(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata)
                .join("nescaster")
                .join("runahead.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("nescaster").join("runahead.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("nescaster")
            .join("runahead.toml");
    }

    PathBuf::from("runahead.toml")
}

pub fn load_from_file(path: &Path) -> CliConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return CliConfig::default(),
    };

    match toml::from_str::<CliConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            CliConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &CliConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
