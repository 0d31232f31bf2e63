use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

/// Per-request scrape configuration. Arrives as camelCase JSON alongside the
/// remote session handle.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeConfig {
    pub county: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    /// Target filing date, `YYYY-MM-DD`. Filter configuration is best-effort,
    /// so an absent date simply skips the calendar widget.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default = "default_start_letter")]
    pub start_letter: String,
    #[serde(default = "default_end_letter")]
    pub end_letter: String,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_query: u32,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

fn default_document_type() -> String {
    "Deed of Trust".to_string()
}

fn default_start_letter() -> String {
    "a".to_string()
}

fn default_end_letter() -> String {
    "z".to_string()
}

fn default_max_pages() -> u32 {
    3
}

impl ScrapeConfig {
    pub fn validate(&self) -> Result<()> {
        debug!("Validating scrape config");

        if self.county.trim().is_empty() {
            return Err(ScrapeError::Config("county is required".to_string()).into());
        }
        if self.max_pages_per_query == 0 {
            return Err(
                ScrapeError::Config("maxPagesPerQuery must be greater than 0".to_string()).into(),
            );
        }
        if self.max_pages_per_query > 100 {
            return Err(ScrapeError::Config(
                "maxPagesPerQuery cannot exceed 100".to_string(),
            )
            .into());
        }
        // letters outside a-z produce an empty query set rather than an error,
        // but a multi-character value is a malformed request
        for (name, value) in [("startLetter", &self.start_letter), ("endLetter", &self.end_letter)] {
            if value.chars().count() != 1 {
                return Err(ScrapeError::Config(format!(
                    "{} must be a single character, got '{}'",
                    name, value
                ))
                .into());
            }
        }
        if let Some(ref creds) = self.credentials {
            if creds.username.trim().is_empty() || creds.password.trim().is_empty() {
                return Err(ScrapeError::Config(
                    "credentials must include a non-empty username and password".to_string(),
                )
                .into());
            }
        }

        debug!("Scrape config validation passed");
        Ok(())
    }

    pub fn start_letter_char(&self) -> char {
        self.start_letter.chars().next().unwrap_or('a')
    }

    pub fn end_letter_char(&self) -> char {
        self.end_letter.chars().next().unwrap_or('z')
    }
}

pub fn alphabet() -> &'static str {
    ALPHABET
}

/// Service-level settings loaded from a TOML file at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub entry_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            entry_url: "https://www.texasfile.com/search/texas/".to_string(),
        }
    }
}

pub struct ServerConfigLoader {
    config_path: PathBuf,
}

impl ServerConfigLoader {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn load(&self) -> Result<ServerConfig> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!(
                "Configuration file not found, creating default config at {:?}",
                self.config_path
            );
            self.create_default()?;
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ScrapeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| ScrapeError::Config(format!("Failed to parse TOML config: {}", e)))?;

        self.validate(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate(&self, config: &ServerConfig) -> Result<()> {
        if config.port < 1024 {
            return Err(
                ScrapeError::Config("port must be between 1024 and 65535".to_string()).into(),
            );
        }
        if !config.entry_url.starts_with("http://") && !config.entry_url.starts_with("https://") {
            return Err(ScrapeError::Config(
                "entry_url must start with http:// or https://".to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn create_default(&self) -> Result<()> {
        let default_config = ServerConfig::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| ScrapeError::Config(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ScrapeError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapeError::Config(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn minimal_config() -> ScrapeConfig {
        serde_json::from_str(r#"{"county": "Travis"}"#).unwrap()
    }

    #[test]
    fn test_scrape_config_defaults() {
        let config = minimal_config();

        assert_eq!(config.county, "Travis");
        assert_eq!(config.document_type, "Deed of Trust");
        assert_eq!(config.start_letter, "a");
        assert_eq!(config.end_letter, "z");
        assert_eq!(config.max_pages_per_query, 3);
        assert!(config.credentials.is_none());
        assert!(config.start_date.is_none());
    }

    #[test]
    fn test_scrape_config_camel_case_fields() {
        let config: ScrapeConfig = serde_json::from_str(
            r#"{
                "county": "Harris",
                "documentType": "Lien",
                "startLetter": "c",
                "endLetter": "f",
                "maxPagesPerQuery": 2,
                "credentials": {"username": "u", "password": "p"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.document_type, "Lien");
        assert_eq!(config.start_letter_char(), 'c');
        assert_eq!(config.end_letter_char(), 'f');
        assert_eq!(config.max_pages_per_query, 2);
        assert!(config.credentials.is_some());
    }

    #[test]
    fn test_scrape_config_validation() {
        assert!(minimal_config().validate().is_ok());

        let mut config = minimal_config();
        config.county = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = minimal_config();
        config.max_pages_per_query = 0;
        assert!(config.validate().is_err());

        let mut config = minimal_config();
        config.start_letter = "ab".to_string();
        assert!(config.validate().is_err());

        let mut config = minimal_config();
        config.credentials = Some(Credentials {
            username: "user".to_string(),
            password: "".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_default_server_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let loader = ServerConfigLoader::new(config_path.clone());

        let config = loader.load().unwrap();

        assert_eq!(config.port, 3000);
        assert!(config.entry_url.contains("texasfile.com"));
        assert!(config_path.exists());
    }

    #[test]
    fn test_server_config_validation() {
        let temp_dir = tempdir().unwrap();
        let loader = ServerConfigLoader::new(temp_dir.path().join("config.toml"));

        let mut config = ServerConfig::default();
        config.port = 80;
        assert!(loader.validate(&config).is_err());

        let mut config = ServerConfig::default();
        config.entry_url = "texasfile.com".to_string();
        assert!(loader.validate(&config).is_err());
    }
}
