//! Global preferences — a small JSON record persisted across sessions.
//!
//! Holds the last-used output folder, export format/quality, global filter
//! and resize defaults, watermark defaults, and the UI theme name (opaque to
//! the engine; the presentation layer interprets it).  Per-image edit state
//! is intentionally *not* persisted.
//!
//! A missing file yields defaults; a corrupt file yields defaults plus a
//! logged warning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::log_warn;

/// Text watermark defaults applied to newly-configured batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkDefaults {
    pub enabled: bool,
    pub text: String,
    pub font_size: f32,
    /// RGB hex string, e.g. "#FFFFFF".
    pub color: String,
    /// 0.0 (invisible) ..= 1.0 (opaque).
    pub opacity: f32,
    /// Anchor name as shown in the UI ("Center", "Diagonal Fit", "Tile", ...).
    pub position: String,
}

impl Default for WatermarkDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            text: "SAMPLE".to_string(),
            font_size: 40.0,
            color: "#FFFFFF".to_string(),
            opacity: 0.5,
            position: "Diagonal Fit".to_string(),
        }
    }
}

/// Persisted application preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Presentation-layer theme name. The engine never interprets this.
    pub theme: String,
    /// Last output folder ("" = write next to the source file).
    pub output_dir: String,
    /// Last export format: "png", "jpeg" or "webp".
    pub format: String,
    /// JPEG / WEBP quality, 1..=100.
    pub quality: u8,
    /// Default filter name ("None", "Sepia", ...).
    pub filter: String,
    pub resize_width: Option<u32>,
    pub resize_height: Option<u32>,
    /// Output filename pattern; supports `<OriginalName>` and `<#>`.
    pub filename_pattern: String,
    pub watermark: WatermarkDefaults,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: "arc".to_string(),
            output_dir: String::new(),
            format: "png".to_string(),
            quality: 95,
            filter: "None".to_string(),
            resize_width: None,
            resize_height: None,
            filename_pattern: "<OriginalName>".to_string(),
            watermark: WatermarkDefaults::default(),
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/batchpix/settings.json  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\batchpix\settings.json
    /// On macOS:   ~/Library/Application Support/batchpix/settings.json
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            let dir = PathBuf::from(appdata).join("batchpix");
            let _ = std::fs::create_dir_all(&dir);
            return Some(dir.join("settings.json"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            let dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("batchpix");
            let _ = std::fs::create_dir_all(&dir);
            return Some(dir.join("settings.json"));
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let base = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            let dir = base.join("batchpix");
            let _ = std::fs::create_dir_all(&dir);
            Some(dir.join("settings.json"))
        }
    }

    /// Load settings from the default location. Missing or unreadable file
    /// falls back to defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from an explicit path (also used for preset files).
    pub fn load_from(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                log_warn!("settings file '{}' is corrupt ({}); using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write settings to the default location. Failures are logged, never fatal.
    pub fn save(&self) {
        if let Some(path) = Self::settings_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log_warn!("failed to save settings to '{}': {}", path.display(), e);
                }
            }
            Err(e) => log_warn!("failed to serialize settings: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let loaded = AppSettings::load_from(&tmp.path().join("nope.json"));
        assert_eq!(loaded, AppSettings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let loaded = AppSettings::load_from(&path);
        assert_eq!(loaded, AppSettings::default());
    }

    #[test]
    fn round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");

        let mut settings = AppSettings::default();
        settings.format = "webp".to_string();
        settings.quality = 80;
        settings.output_dir = "/tmp/out".to_string();
        settings.watermark.enabled = true;
        settings.watermark.text = "© 2026".to_string();
        settings.save_to(&path);

        let loaded = AppSettings::load_from(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"format":"jpeg","legacy_field":42}"#).unwrap();
        let loaded = AppSettings::load_from(&path);
        assert_eq!(loaded.format, "jpeg");
        assert_eq!(loaded.quality, 95);
    }
}
