use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/Xenova/mobilenet_v2_1.0_224/resolve/main/onnx/model.onnx";
const DEFAULT_CONFIG_URL: &str =
    "https://huggingface.co/Xenova/mobilenet_v2_1.0_224/resolve/main/config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub model_url: String,
    pub config_url: String,
    pub model_file: String,
    pub config_file: String,
    pub crop_size: u32,
    pub crop_pct: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub top_k: usize,
    pub use_gpu: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            config_url: DEFAULT_CONFIG_URL.to_string(),
            model_file: "mobilenet_v2_1.0_224.onnx".to_string(),
            config_file: "mobilenet_v2_1.0_224-config.json".to_string(),
            crop_size: 224,
            crop_pct: 0.875,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            top_k: 3,
            use_gpu: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Oldest history entries beyond this are dropped. `None` keeps everything.
    pub history_limit: Option<usize>,
    pub classifier: ClassifierSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            history_limit: None,
            classifier: ClassifierSettings::default(),
        }
    }
}

impl Settings {
    /// Reads `settings.json` from `dir`. A missing or malformed file yields defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}; using defaults", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Invalid settings in {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}
