//! Engine settings storage
//!
//! Stores configuration in a JSON file in the user config directory, with
//! environment variables layered on top. Settings are loaded once by the
//! caller and passed down; nothing here is global.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory for the writable registry and the resolution cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Shipped registry snapshot; used when the file exists
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default)]
    pub retry_errors: bool,
    #[serde(default = "default_true")]
    pub retry_paywall: bool,
    /// Contact address sent to CrossRef (polite pool)
    #[serde(default)]
    pub crossref_mailto: Option<String>,
    /// Overrides the browser user agent used for verification
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("articlelink")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            registry_path: None,
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            verify: true,
            retry_errors: false,
            retry_paywall: true, // publishers open up over time
            crossref_mailto: None,
            user_agent: None,
        }
    }
}

/// `<config dir>/articlelink/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("articlelink")
        .join(SETTINGS_FILE)
}

impl Settings {
    /// Load settings from disk or fall back to defaults
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "ignoring unreadable settings: {}", e);
                        Settings::default()
                    }
                },
                Err(_) => Settings::default(),
            }
        } else {
            Settings::default()
        }
    }

    /// Settings file (if any) plus environment overrides
    pub fn load_with_env(path: &Path) -> Self {
        let mut settings = Self::load(path);
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))?;
        Ok(())
    }

    /// Layer `ARTICLELINK_*` / `CROSSREF_MAILTO` values over the file settings
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("ARTICLELINK_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("ARTICLELINK_REGISTRY") {
            self.registry_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = var("ARTICLELINK_TIMEOUT") {
            match raw.trim().parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "ARTICLELINK_TIMEOUT is not a number of seconds"),
            }
        }
        if let Some(raw) = var("ARTICLELINK_MAX_REDIRECTS") {
            match raw.trim().parse() {
                Ok(n) => self.max_redirects = n,
                Err(_) => tracing::warn!(value = %raw, "ARTICLELINK_MAX_REDIRECTS is not a number"),
            }
        }
        if let Some(mailto) = var("CROSSREF_MAILTO") {
            self.crossref_mailto = Some(mailto);
        }
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_dir.join("findit.db")
    }

    /// Shipped snapshot when present, otherwise the writable copy in the cache dir
    pub fn registry_db_path(&self) -> PathBuf {
        match &self.registry_path {
            Some(path) if path.exists() => path.clone(),
            _ => self.cache_dir.join("registry.db"),
        }
    }
}
