use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fs, path::Path, path::PathBuf, time::Duration};

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Where normalized records are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Stdout,
    Elasticsearch,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Stdout => "stdout",
            SinkKind::Elasticsearch => "elasticsearch",
        }
    }

    pub const fn all() -> &'static [SinkKind] {
        &[SinkKind::Stdout, SinkKind::Elasticsearch]
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SinkKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "stdout" => Ok(SinkKind::Stdout),
            "elasticsearch" | "es" => Ok(SinkKind::Elasticsearch),
            _ => Err(anyhow!("Unknown sink '{value}'. Supported sinks: stdout, elasticsearch.")),
        }
    }
}

/// Credentials and endpoint of the weather provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "openweather".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KibanaConfig {
    pub url: String,
    /// Title of the index pattern, e.g. "openweather*".
    pub index_pattern: String,
    /// Saved-object id the pattern is stored under.
    pub pattern_id: String,
}

impl Default for KibanaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5601".to_string(),
            index_pattern: "openweather*".to_string(),
            pattern_id: "openweather-pattern".to_string(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// cities = ["London", "Paris"]
/// interval_secs = 60
/// sink = "elasticsearch"
///
/// [openweather]
/// api_key = "..."
///
/// [elasticsearch]
/// url = "http://localhost:9200"
/// index = "openweather"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cities: Vec<String>,
    pub interval_secs: u64,
    pub sink: SinkKind,
    pub openweather: OpenWeatherConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub kibana: KibanaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cities: ["London", "Berlin", "Paris", "Barcelona", "Amsterdam", "Krakow", "Vienna"]
                .into_iter()
                .map(String::from)
                .collect(),
            interval_secs: 60,
            sink: SinkKind::default(),
            openweather: OpenWeatherConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            kibana: KibanaConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the platform config directory, then apply the
    /// `OPENWEATHER_API_KEY` override.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    /// Load config from `path`, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-stream", "weather-stream")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// A non-empty override replaces whatever key was stored on disk.
    pub fn apply_api_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.openweather.api_key = Some(key);
        }
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.openweather.api_key = Some(api_key);
    }

    /// Returns the provider API key, or an error explaining how to set one.
    pub fn api_key(&self) -> Result<&str> {
        self.openweather
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No OpenWeather API key configured.\n\
                     Hint: run `weather-stream configure` or set {API_KEY_ENV}."
                )
            })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.openweather.timeout_secs)
    }
}
