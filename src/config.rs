use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;
use crate::services::recommendations::SynthesizerSettings;
use crate::spotify_rs::auth::SpotifyApiCredentials;
use crate::spotify_rs::client::{DEFAULT_ACCOUNTS_BASE, DEFAULT_API_BASE, GatewayConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spotify: SpotifyConfig,
    pub breakers: BreakersConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub recommendations: RecommendationsConfig,
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub api_base: String,
    pub accounts_base: String,
    pub timeout_secs: u64,
    /// Optional client-side pacing of upstream requests.
    pub requests_per_second: Option<u32>,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            accounts_base: DEFAULT_ACCOUNTS_BASE.to_string(),
            timeout_secs: 10,
            requests_per_second: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakersConfig {
    pub spotify: BreakerConfig,
    pub token_vault: BreakerConfig,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            spotify: BreakerConfig {
                failure_threshold: 5,
                recovery_timeout_secs: 60,
            },
            token_vault: BreakerConfig {
                failure_threshold: 10,
                recovery_timeout_secs: 30,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            base: policy.base,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            base: self.base,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationsConfig {
    pub default_market: String,
    pub default_genres: Vec<String>,
    pub max_seeds: usize,
}

impl Default for RecommendationsConfig {
    fn default() -> Self {
        let settings = SynthesizerSettings::default();
        Self {
            default_market: settings.default_market,
            default_genres: settings.default_genres,
            max_seeds: settings.max_seeds,
        }
    }
}

impl RecommendationsConfig {
    pub fn settings(&self) -> SynthesizerSettings {
        SynthesizerSettings {
            default_genres: self.default_genres.clone(),
            default_market: self.default_market.clone(),
            max_seeds: self.max_seeds,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub backend: VaultBackend,
    /// Defaults to `<data dir>/music-discovery/credentials.db`.
    pub database_path: Option<String>,
    /// Key material for token encryption. Without it an ephemeral key is used.
    pub crypto_key: Option<String>,
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("music-discovery").join("config.toml"))
    }

    /// Load the default config file, falling back to defaults when it does not exist
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Write the default config to the default path, if it doesn't exist
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or(eyre!("No config directory on this platform"))?;
        if path.exists() {
            tracing::info!("Config already exists at {}", path.display());
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create config directory: {}",
                parent.display()
            ))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .context(format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, breaker) in [
            ("spotify", &self.breakers.spotify),
            ("token_vault", &self.breakers.token_vault),
        ] {
            if breaker.failure_threshold == 0 {
                return Err(eyre!("breakers.{}.failure_threshold must be at least 1", name));
            }
        }
        if self.retry.base < 1.0 {
            return Err(eyre!("retry.base must be at least 1.0"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(eyre!("retry.initial_delay_ms must not exceed retry.max_delay_ms"));
        }
        if self.recommendations.max_seeds == 0 {
            return Err(eyre!("recommendations.max_seeds must be at least 1"));
        }
        if self.spotify.requests_per_second == Some(0) {
            return Err(eyre!("spotify.requests_per_second must be at least 1"));
        }
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.vault.database_path {
            Some(path) => self.expand_path(path),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("music-discovery")
                .join("credentials.db"),
        }
    }

    pub fn spotify_credentials(&self) -> Option<SpotifyApiCredentials> {
        match (&self.spotify.client_id, &self.spotify.client_secret) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyApiCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => None,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            api_base: self.spotify.api_base.clone(),
            accounts_base: self.spotify.accounts_base.clone(),
            credentials: self.spotify_credentials(),
            timeout: Duration::from_secs(self.spotify.timeout_secs),
            requests_per_second: self.spotify.requests_per_second.and_then(NonZeroU32::new),
        }
    }
}
