// src/settings.rs - Persistent viewer settings
use crate::playback::CatchUp;
use crate::skeleton::Reconstructor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ASPECT_RATIO: f64 = 1280.0 / 720.0;
pub const DEFAULT_ANCHOR_SCALE: f64 = 2.0;
pub const DEFAULT_MIN_FRAME_WAIT_MS: u64 = 100;
pub const DEFAULT_LIVE_PORT: u16 = 38013;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Used when a frame carries no usable `camera_params`.
    pub default_aspect_ratio: f64,
    /// Scale applied to face and hand groups before anchoring on the pose.
    pub anchor_scale: f64,
    /// Frame wait used when recorded stamps do not increase.
    pub min_frame_wait_ms: u64,
    pub catch_up: CatchUp,
    pub live_bind_addr: String,
    pub recording_dir: PathBuf,
    /// Host (and optional port) that receives each frame reached during
    /// playback. Empty disables replay.
    pub replay_target: String,
    pub show_grid: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_aspect_ratio: DEFAULT_ASPECT_RATIO,
            anchor_scale: DEFAULT_ANCHOR_SCALE,
            min_frame_wait_ms: DEFAULT_MIN_FRAME_WAIT_MS,
            catch_up: CatchUp::default(),
            live_bind_addr: format!("0.0.0.0:{}", DEFAULT_LIVE_PORT),
            recording_dir: directories::UserDirs::new()
                .and_then(|dirs| dirs.document_dir().map(|p| p.join("HolisticViewer")))
                .unwrap_or_else(|| PathBuf::from("./recordings")),
            replay_target: String::new(),
            show_grid: true,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "HolisticViewer")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Loads the user's settings, falling back to defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No configuration directory available, using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Failed to read settings {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match Self::parse(&text) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring malformed settings {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(text).context("Failed to parse settings JSON")?;
        Ok(settings.sanitized())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("No configuration directory available")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn min_frame_wait(&self) -> Duration {
        Duration::from_millis(self.min_frame_wait_ms)
    }

    /// Replay destination as `host:port`, using the live port when none is
    /// given.
    pub fn replay_addr(&self) -> Option<String> {
        let target = self.replay_target.trim();
        if target.is_empty() {
            None
        } else if target.contains(':') {
            Some(target.to_string())
        } else {
            Some(format!("{}:{}", target, DEFAULT_LIVE_PORT))
        }
    }

    pub fn reconstructor(&self) -> Reconstructor {
        Reconstructor::new(self.default_aspect_ratio, self.anchor_scale)
    }

    /// Replaces values that would break the coordinate mapping or the
    /// scheduler with their defaults.
    fn sanitized(mut self) -> Self {
        if !(self.default_aspect_ratio.is_finite() && self.default_aspect_ratio > 0.0) {
            warn!("Invalid default_aspect_ratio {}, using default", self.default_aspect_ratio);
            self.default_aspect_ratio = DEFAULT_ASPECT_RATIO;
        }
        if !self.anchor_scale.is_finite() {
            warn!("Invalid anchor_scale {}, using default", self.anchor_scale);
            self.anchor_scale = DEFAULT_ANCHOR_SCALE;
        }
        if self.min_frame_wait_ms == 0 {
            warn!("min_frame_wait_ms must be positive, using default");
            self.min_frame_wait_ms = DEFAULT_MIN_FRAME_WAIT_MS;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!((settings.default_aspect_ratio - 1280.0 / 720.0).abs() < 1e-12);
        assert_eq!(settings.anchor_scale, 2.0);
        assert_eq!(settings.min_frame_wait(), Duration::from_millis(100));
        assert_eq!(settings.catch_up, CatchUp::Single);
        assert_eq!(settings.live_bind_addr, "0.0.0.0:38013");
        assert!(settings.show_grid);
        assert_eq!(settings.replay_addr(), None);
    }

    #[test]
    fn test_replay_addr_defaults_the_port() {
        let with = |target: &str| Settings { replay_target: target.to_string(), ..Settings::default() };
        assert_eq!(with("  ").replay_addr(), None);
        assert_eq!(with("192.168.0.12").replay_addr().as_deref(), Some("192.168.0.12:38013"));
        assert_eq!(with("localhost:9000").replay_addr().as_deref(), Some("localhost:9000"));
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let settings = Settings::parse(r#"{"catch_up": "drain", "show_grid": false}"#).unwrap();
        assert_eq!(settings.catch_up, CatchUp::Drain);
        assert!(!settings.show_grid);
        assert_eq!(settings.anchor_scale, 2.0);
        assert_eq!(settings.min_frame_wait_ms, 100);
    }

    #[test]
    fn test_invalid_values_are_replaced() {
        let settings =
            Settings::parse(r#"{"default_aspect_ratio": -1.0, "min_frame_wait_ms": 0}"#).unwrap();
        assert_eq!(settings.default_aspect_ratio, DEFAULT_ASPECT_RATIO);
        assert_eq!(settings.min_frame_wait_ms, DEFAULT_MIN_FRAME_WAIT_MS);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(Settings::parse("{not json").is_err());
        assert!(Settings::parse(r#"{"catch_up": "sometimes"}"#).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("holistic_viewer_settings_{}", std::process::id()));
        let path = dir.join(SETTINGS_FILE);
        let settings = Settings {
            min_frame_wait_ms: 40,
            catch_up: CatchUp::Drain,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("holistic_viewer_does_not_exist/settings.json");
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
