// Persisted user configuration
//
// A flat key-value JSON document under the platform config directory.
// Missing keys fall back to defaults, unknown keys are ignored, and a
// malformed file loads as defaults instead of failing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_path: String,
    /// Target vertical resolution ("1080", "720", ...) or "best".
    pub video_quality: String,
    /// Audio bitrate in kbps, e.g. "192".
    pub audio_quality: String,
    pub output_format: OutputFormat,
    pub video_format: String,
    pub audio_format: String,
    pub geo_bypass: bool,
    pub geo_country: String,
    pub embed_thumbnail: bool,
    pub download_subtitles: bool,
    pub subtitle_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .to_string_lossy()
                .to_string(),
            video_quality: "1080".to_string(),
            audio_quality: "192".to_string(),
            output_format: OutputFormat::Video,
            video_format: "mp4".to_string(),
            audio_format: "mp3".to_string(),
            geo_bypass: false,
            geo_country: "BR".to_string(),
            embed_thumbnail: false,
            download_subtitles: false,
            subtitle_language: "pt".to_string(),
        }
    }
}

impl AppConfig {
    /// Location of the persisted document, when the platform exposes a
    /// config directory.
    pub fn config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ytdlp-driver").join("config.json"))
    }

    pub fn load() -> Self {
        match Self::config_file() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. Any I/O or parse problem degrades to
    /// defaults; configuration is never a fatal error.
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[Config] Malformed config at {}: {} (using defaults)", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_file() {
            if let Err(e) = self.save_to(&path) {
                eprintln!("[Config] Failed to save {}: {}", path.display(), e);
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }
}
