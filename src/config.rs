//! Runtime configuration for the agent loop

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration shared by every session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bearer token for the completion endpoints
    pub api_key: String,
    /// Model drafting and repairing code
    pub coder_model: String,
    /// Model diagnosing failed executions
    pub inspector_model: String,
    /// Model used for report generation
    pub chat_model: String,
    pub coder_base_url: String,
    pub inspector_base_url: String,
    pub chat_base_url: String,
    /// Maximum repair rounds per top-level request
    pub max_attempts: usize,
    /// Hard timeout for one code execution, in seconds
    pub max_exe_time_secs: u64,
    /// Repair round (1-based) at which the inspector is skipped in favor
    /// of the fixed fallback instruction, after three full consultations.
    /// Kept independent of `max_attempts`; a loop shorter than this never
    /// uses the fallback.
    pub inspector_escalation_round: usize,
    /// Parent directory for per-session cache directories
    pub project_cache_path: PathBuf,
    /// Whether knowledge retrieval augments coder requests
    pub retrieval: bool,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            coder_model: "gpt-4o-mini".to_string(),
            inspector_model: "gpt-4o-mini".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            coder_base_url: DEFAULT_BASE_URL.to_string(),
            inspector_base_url: DEFAULT_BASE_URL.to_string(),
            chat_base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: 5,
            max_exe_time_secs: 60,
            inspector_escalation_round: 4,
            project_cache_path: PathBuf::from("cache"),
            retrieval: false,
        }
    }
}

impl Config {
    /// Defaults overridden from the environment
    ///
    /// `ABACUS_API_KEY` (falling back to `OPENAI_API_KEY`),
    /// `ABACUS_BASE_URL`, `ABACUS_MODEL`, `ABACUS_CACHE_PATH`, and
    /// `ABACUS_RETRIEVAL` are honored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("ABACUS_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("ABACUS_BASE_URL") {
            config.coder_base_url = url.clone();
            config.inspector_base_url = url.clone();
            config.chat_base_url = url;
        }
        if let Ok(model) = std::env::var("ABACUS_MODEL") {
            config.coder_model = model.clone();
            config.inspector_model = model.clone();
            config.chat_model = model;
        }
        if let Ok(path) = std::env::var("ABACUS_CACHE_PATH") {
            config.project_cache_path = PathBuf::from(path);
        }
        if let Ok(flag) = std::env::var("ABACUS_RETRIEVAL") {
            config.retrieval = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        config
    }

    /// Load a configuration saved with [`Config::save`]
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    pub fn max_exe_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_exe_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.inspector_escalation_round, 4);
        assert_eq!(config.max_exe_time_secs, 60);
        assert!(!config.retrieval);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.max_attempts = 7;
        config.coder_model = "custom-model".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.max_attempts, 7);
        assert_eq!(loaded.coder_model, "custom-model");
    }
}
