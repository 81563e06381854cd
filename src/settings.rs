//! Application settings storage
//!
//! Stores API credentials and tuning knobs in a JSON file in the app data
//! directory. Environment variables take precedence for secrets.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

/// Global settings instance
static SETTINGS: RwLock<Option<Settings>> = RwLock::new(None);

/// Path to config file (set during init)
static CONFIG_PATH: RwLock<Option<PathBuf>> = RwLock::new(None);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsageStats {
    #[serde(default)]
    pub total_anthropic_input_tokens: u64,
    #[serde(default)]
    pub total_anthropic_output_tokens: u64,
    #[serde(default)]
    pub scan_runs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub gmail_access_token: Option<String>,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    /// Manual override for the pass-1 merge threshold (None = adaptive)
    #[serde(default)]
    pub clustering_threshold: Option<f32>,
    /// Pass-1 groups at or below this size are never subdivided
    #[serde(default = "default_max_unsplit_size")]
    pub max_unsplit_size: usize,
    #[serde(default = "default_kmeans_seed")]
    pub kmeans_seed: u64,
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
    /// Pause between mutation batches, in milliseconds
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default)]
    pub usage_stats: UsageStats,
}

fn default_anthropic_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}

fn default_max_unsplit_size() -> usize {
    8
}

fn default_kmeans_seed() -> u64 {
    42
}

fn default_delete_batch_size() -> usize {
    100
}

fn default_batch_pause_ms() -> u64 {
    400
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            gmail_access_token: None,
            anthropic_model: default_anthropic_model(),
            clustering_threshold: None,
            max_unsplit_size: default_max_unsplit_size(),
            kmeans_seed: default_kmeans_seed(),
            delete_batch_size: default_delete_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            usage_stats: UsageStats::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk or create default
    fn load(path: &PathBuf) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => Settings::default(),
            }
        } else {
            Settings::default()
        }
    }

    /// Save settings to disk
    fn save(&self, path: &PathBuf) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }
}

/// Initialize settings from the given data directory
pub fn init(data_dir: PathBuf) {
    let path = data_dir.join("settings.json");
    let settings = Settings::load(&path);
    *SETTINGS.write().unwrap() = Some(settings);
    *CONFIG_PATH.write().unwrap() = Some(path);
}

/// Initialize using the platform data directory
pub fn init_default() {
    let data_dir = dirs::data_dir()
        .map(|p| p.join("com.mailsweep.app"))
        .unwrap_or_else(|| PathBuf::from("."));
    init(data_dir);
}

/// Snapshot of the current settings (default if not initialized)
pub fn current() -> Settings {
    SETTINGS.read().unwrap().clone().unwrap_or_default()
}

fn update<F: FnOnce(&mut Settings)>(f: F) -> Result<(), String> {
    let mut guard = SETTINGS.write().unwrap();
    let settings = guard.get_or_insert_with(Settings::default);
    f(settings);
    if let Some(path) = CONFIG_PATH.read().unwrap().as_ref() {
        settings.save(path)?;
    }
    Ok(())
}

/// Anthropic API key: env var first, then stored setting
pub fn get_api_key() -> Option<String> {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.trim().is_empty() {
            return Some(key);
        }
    }
    current().anthropic_api_key.filter(|k| !k.trim().is_empty())
}

pub fn has_api_key() -> bool {
    get_api_key().is_some()
}

pub fn set_api_key(key: &str) -> Result<(), String> {
    update(|s| s.anthropic_api_key = Some(key.trim().to_string()))
}

/// Gmail OAuth bearer token: env var first, then stored setting
pub fn get_gmail_token() -> Option<String> {
    if let Ok(token) = std::env::var("GMAIL_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            return Some(token);
        }
    }
    current().gmail_access_token.filter(|t| !t.trim().is_empty())
}

pub fn set_gmail_token(token: &str) -> Result<(), String> {
    update(|s| s.gmail_access_token = Some(token.trim().to_string()))
}

pub fn get_anthropic_model() -> String {
    current().anthropic_model
}

pub fn add_anthropic_tokens(input: u64, output: u64) -> Result<(), String> {
    update(|s| {
        s.usage_stats.total_anthropic_input_tokens += input;
        s.usage_stats.total_anthropic_output_tokens += output;
    })
}

pub fn record_scan_run() -> Result<(), String> {
    update(|s| s.usage_stats.scan_runs += 1)
}
