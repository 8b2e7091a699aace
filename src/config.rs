use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Catálogo
    pub catalog_api_base_url: String,
    pub http_timeout_secs: u64,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub history_size: usize,

    // Radio
    pub radio_retry_base_ms: u64,
    pub radio_retry_error_ms: u64,
    pub radio_retry_max_delay_secs: u64,
    pub radio_max_failures: u32, // 0 = sin límite

    // Tiempos
    pub idle_timeout_secs: u64,
    pub idle_sweep_interval_secs: u64,
    pub progress_refresh_secs: u64,
    pub now_playing_delete_delay_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|id| *id != 0),

            catalog_api_base_url: std::env::var("CATALOG_API_BASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.catalog_api_base_url),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,

            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            history_size: env_or("HISTORY_SIZE", defaults.history_size)?,

            radio_retry_base_ms: env_or("RADIO_RETRY_BASE_MS", defaults.radio_retry_base_ms)?,
            radio_retry_error_ms: env_or("RADIO_RETRY_ERROR_MS", defaults.radio_retry_error_ms)?,
            radio_retry_max_delay_secs: env_or(
                "RADIO_RETRY_MAX_DELAY_SECS",
                defaults.radio_retry_max_delay_secs,
            )?,
            radio_max_failures: env_or("RADIO_MAX_FAILURES", defaults.radio_max_failures)?,

            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            idle_sweep_interval_secs: env_or(
                "IDLE_SWEEP_INTERVAL_SECS",
                defaults.idle_sweep_interval_secs,
            )?,
            progress_refresh_secs: env_or("PROGRESS_REFRESH_SECS", defaults.progress_refresh_secs)?,
            now_playing_delete_delay_secs: env_or(
                "NOW_PLAYING_DELETE_DELAY_SECS",
                defaults.now_playing_delete_delay_secs,
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue and history sizes must be greater than 0
    /// - Every interval and threshold must be greater than 0
    /// - The radio retry base delay must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.history_size == 0 {
            anyhow::bail!("History size must be greater than 0");
        }

        if self.radio_retry_base_ms == 0 {
            anyhow::bail!("Radio retry base delay must be greater than 0");
        }

        let intervals = [
            ("HTTP_TIMEOUT_SECS", self.http_timeout_secs),
            ("IDLE_TIMEOUT_SECS", self.idle_timeout_secs),
            ("IDLE_SWEEP_INTERVAL_SECS", self.idle_sweep_interval_secs),
            ("PROGRESS_REFRESH_SECS", self.progress_refresh_secs),
            ("RADIO_RETRY_MAX_DELAY_SECS", self.radio_retry_max_delay_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if !self.catalog_api_base_url.starts_with("http://")
            && !self.catalog_api_base_url.starts_with("https://")
        {
            anyhow::bail!(
                "CATALOG_API_BASE_URL must be an http(s) URL, got: {}",
                self.catalog_api_base_url
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Catalog: {} ({}s timeout)\n  \
            Audio: {}% vol, {} queue, {} history\n  \
            Radio: retry {}ms/{}ms up to {}s, max failures {}\n  \
            Idle: {}s threshold, sweep every {}s, progress every {}s",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.catalog_api_base_url,
            self.http_timeout_secs,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.history_size,
            self.radio_retry_base_ms,
            self.radio_retry_error_ms,
            self.radio_retry_max_delay_secs,
            if self.radio_max_failures == 0 {
                "unbounded".to_string()
            } else {
                self.radio_max_failures.to_string()
            },
            self.idle_timeout_secs,
            self.idle_sweep_interval_secs,
            self.progress_refresh_secs,
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_interval_secs)
    }

    pub fn progress_refresh(&self) -> Duration {
        Duration::from_secs(self.progress_refresh_secs)
    }

    pub fn now_playing_delete_delay(&self) -> Duration {
        Duration::from_secs(self.now_playing_delete_delay_secs)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {}", key, val)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            catalog_api_base_url: "https://juicewrldapi.com".to_string(),
            http_timeout_secs: 30,

            default_volume: 0.5,
            max_queue_size: 500,
            history_size: 10,

            radio_retry_base_ms: 1000,
            radio_retry_error_ms: 2000,
            radio_retry_max_delay_secs: 30,
            radio_max_failures: 10,

            idle_timeout_secs: 1800, // 30 minutos
            idle_sweep_interval_secs: 60,
            progress_refresh_secs: 5,
            now_playing_delete_delay_secs: 1,
        }
    }
}
