// Application configuration

use crate::error::{MoodLensError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const FACE_MODEL_NAME: &str = "haarcascade_frontalface_default.xml";
pub const FACE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

pub const EXPRESSION_MODEL_NAME: &str = "enet_b2_8.onnx";
pub const EXPRESSION_MODEL_URL: &str =
    "https://github.com/av-savchenko/face-emotion-recognition/raw/main/models/affectnet_emotions/onnx/enet_b2_8.onnx";

/// Application settings, read from an optional JSON file next to the
/// binary. Every field has a default so an absent file means defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Requested capture width in pixels
    #[serde(default = "default_camera_width")]
    pub camera_width: u32,
    /// Requested capture height in pixels
    #[serde(default = "default_camera_height")]
    pub camera_height: u32,
    /// Requested capture frame rate
    #[serde(default = "default_camera_fps")]
    pub camera_fps: u32,
    /// Detection poll interval in milliseconds
    #[serde(default = "default_detect_interval_ms")]
    pub detect_interval_ms: u64,
    /// Face detector artifact source
    #[serde(default = "default_face_model_url")]
    pub face_model_url: String,
    /// Expression classifier artifact source
    #[serde(default = "default_expression_model_url")]
    pub expression_model_url: String,
    /// Directory checked for pre-bundled model artifacts before downloading
    #[serde(default = "default_bundled_dir")]
    pub bundled_model_dir: PathBuf,
    /// Overrides the platform model cache directory when set
    #[serde(default)]
    pub model_cache_dir: Option<PathBuf>,
}

fn default_camera_width() -> u32 {
    640
}

fn default_camera_height() -> u32 {
    480
}

fn default_camera_fps() -> u32 {
    30
}

fn default_detect_interval_ms() -> u64 {
    100
}

fn default_face_model_url() -> String {
    FACE_MODEL_URL.to_string()
}

fn default_expression_model_url() -> String {
    EXPRESSION_MODEL_URL.to_string()
}

fn default_bundled_dir() -> PathBuf {
    PathBuf::from("assets/models")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera_width: default_camera_width(),
            camera_height: default_camera_height(),
            camera_fps: default_camera_fps(),
            detect_interval_ms: default_detect_interval_ms(),
            face_model_url: default_face_model_url(),
            expression_model_url: default_expression_model_url(),
            bundled_model_dir: default_bundled_dir(),
            model_cache_dir: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file; an absent file yields defaults,
    /// a malformed file is an error
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            MoodLensError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(tmp.path().join("moodlens.json")).unwrap();
        assert_eq!(config.camera_width, 640);
        assert_eq!(config.camera_height, 480);
        assert_eq!(config.detect_interval_ms, 100);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("moodlens.json");
        std::fs::write(&path, r#"{"detect_interval_ms": 250}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.detect_interval_ms, 250);
        assert_eq!(config.camera_width, 640);
        assert_eq!(config.face_model_url, FACE_MODEL_URL);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("moodlens.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(AppConfig::load(&path).is_err());
    }
}
