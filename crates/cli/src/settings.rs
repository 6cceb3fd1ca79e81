use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use facesnap_core::shared::constants::{
    DEFAULT_CAPTURE_TIMEOUT, DEFAULT_CONFIDENCE, DEFAULT_FPS, DEFAULT_JPEG_QUALITY,
    DEFAULT_POOL_SIZE,
};

/// Persistent defaults. Every field can be overridden on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub confidence: f64,
    pub fps: f64,
    pub rotation: u32,
    pub pool_size: usize,
    /// 0 disables the capture watchdog.
    pub capture_timeout_secs: u64,
    pub max_captures: usize,
    pub jpeg_quality: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: None,
            model_path: None,
            confidence: DEFAULT_CONFIDENCE,
            fps: DEFAULT_FPS,
            rotation: 0,
            pool_size: DEFAULT_POOL_SIZE,
            capture_timeout_secs: DEFAULT_CAPTURE_TIMEOUT.as_secs(),
            max_captures: 0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceSnap").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Reads settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings in {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path().ok_or("No configuration directory on this platform")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
