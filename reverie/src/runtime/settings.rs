use serde::{Deserialize, Serialize};

use super::storage;
use crate::io::audio::DEFAULT_VOLUME;
use crate::registry::ScriptLimits;

pub const SETTINGS_VERSION: &str = "1";

pub const DEFAULT_API_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    pub units_dir: String,
    /// Empty means the built-in instructions.
    pub system_instructions_path: String,
    pub api_base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// is never written to disk.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub fps: f32,
    pub window_scale: u32,
    pub max_script_operations: u64,
    pub tone_volume: f32,
    pub watch_units: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION.to_string(),
            units_dir: storage::default_units_dir(),
            system_instructions_path: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            request_timeout_secs: 120,
            fps: 60.0,
            window_scale: 2,
            max_script_operations: ScriptLimits::default().max_operations,
            tone_volume: DEFAULT_VOLUME,
            watch_units: true,
        }
    }
}

impl Settings {
    pub fn script_limits(&self) -> ScriptLimits {
        ScriptLimits::with_max_operations(self.max_script_operations)
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
