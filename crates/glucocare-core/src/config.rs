use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::language::Language;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    /// Model used for food images. Falls back to `model` when unset.
    pub vision_model: Option<String>,
    pub language: String,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub base_url: String,
    pub ocr_command: String,
    pub ocr_language: String,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            vision_model: None,
            language: Language::English.code().to_string(),
            min_interval_ms: 6000,
            max_retries: 3,
            temperature: 0.4,
            max_output_tokens: 2048,
            base_url: DEFAULT_BASE_URL.to_string(),
            ocr_command: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            data_dir: None,
        }
    }

    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Persist an API key entered interactively, keeping the rest of the file.
    pub fn save_api_key(key: &str) -> Result<()> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path).unwrap_or_else(|_| Self::new());
        config.api_key = Some(key.to_string());
        config.save_to(&config_path)
    }

    /// Environment wins over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("GLUCOCARE_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        if let Some(model) = lookup("GLUCOCARE_VISION_MODEL").filter(|m| !m.trim().is_empty()) {
            self.vision_model = Some(model);
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or(&self.model)
    }

    pub fn language(&self) -> Language {
        Language::from_str(&self.language).unwrap_or_default()
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("glucocare"))
                .ok_or_else(|| anyhow!("Could not determine data directory")),
        }
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("glucocare").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.min_interval(), Duration::from_millis(6000));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "model": "gemini-2.0-flash", "language": "hi" }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.language(), Language::Hindi);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.api_key = Some("abc".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides_file() {
        let vars: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "from-env"),
            ("GLUCOCARE_VISION_MODEL", "gemini-vision"),
            ("GLUCOCARE_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::new();
        config.api_key = Some("from-file".to_string());
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.vision_model(), "gemini-vision");
    }

    #[test]
    fn test_vision_model_falls_back_to_text_model() {
        let config = Config::new();
        assert_eq!(config.vision_model(), DEFAULT_MODEL);
        assert!(!config.has_api_key());
    }
}
