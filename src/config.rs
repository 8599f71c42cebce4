use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub max_concurrent_downloads: usize,
    pub ytdlp_path: String,
    pub proxy: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("./downloads"),
            max_concurrent_downloads: 3,
            ytdlp_path: "yt-dlp".to_string(),
            proxy: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| AppError::Config("Config path has no parent directory".to_string()))?;

        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("vidgrab").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_bounded() {
        let config = AppConfig::default();
        assert!(config.max_concurrent_downloads > 0);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.proxy.is_none());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AppConfig {
            download_path: PathBuf::from("/tmp/media"),
            max_concurrent_downloads: 5,
            ytdlp_path: "/usr/local/bin/yt-dlp".to_string(),
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.download_path, config.download_path);
        assert_eq!(parsed.max_concurrent_downloads, 5);
        assert_eq!(parsed.proxy, config.proxy);
    }
}
