use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0";

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Reproducción
    pub default_volume: u8,
    pub max_history_size: usize,
    pub idle_timeout: Duration,
    pub reconnect_delay: Duration,
    pub reconnect_timeout: Duration,

    // Cache
    pub max_cache_size: usize,
    pub cache_ttl: Duration,

    // Extracción
    pub extraction_workers: usize,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub user_agent: String,

    // Paths
    pub data_dir: PathBuf,

    // APIs (opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("cannot create {}", config.data_dir.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Construye la configuración desde una función de búsqueda de variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,

            default_volume: parse_or(get("DEFAULT_VOLUME"), "DEFAULT_VOLUME", 100)?,
            max_history_size: parse_or(get("MAX_HISTORY_SIZE"), "MAX_HISTORY_SIZE", 30)?,
            idle_timeout: duration_or(get("IDLE_TIMEOUT"), "IDLE_TIMEOUT", Duration::from_secs(300))?,
            reconnect_delay: duration_or(get("RECONNECT_DELAY"), "RECONNECT_DELAY", Duration::from_secs(2))?,
            reconnect_timeout: duration_or(
                get("RECONNECT_TIMEOUT"),
                "RECONNECT_TIMEOUT",
                Duration::from_secs(10),
            )?,

            max_cache_size: parse_or(get("MAX_CACHE_SIZE"), "MAX_CACHE_SIZE", 500)?,
            cache_ttl: duration_or(get("CACHE_TTL"), "CACHE_TTL", Duration::from_secs(3600))?,

            extraction_workers: parse_or(get("EXTRACTION_WORKERS"), "EXTRACTION_WORKERS", 3)?,
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_path: get("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            user_agent: get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),

            data_dir: get("DATA_DIR").unwrap_or_else(|| "./data".to_string()).into(),

            spotify_client_id: get("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: get("SPOTIFY_CLIENT_SECRET"),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - History, cache and worker sizes must be greater than 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }
        if self.max_history_size == 0 {
            anyhow::bail!("Max history size must be greater than 0");
        }
        if self.max_cache_size == 0 {
            anyhow::bail!("Max cache size must be greater than 0");
        }
        if self.extraction_workers == 0 {
            anyhow::bail!("Extraction workers must be greater than 0");
        }
        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }
        Ok(())
    }

    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        Some((self.spotify_client_id.clone()?, self.spotify_client_secret.clone()?))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_volume: self.default_volume,
            max_history_size: self.max_history_size,
            max_cache_size: self.max_cache_size,
            cache_ttl: self.cache_ttl,
            idle_timeout: self.idle_timeout,
            reconnect_delay: self.reconnect_delay,
            reconnect_timeout: self.reconnect_timeout,
            ..EngineSettings::default()
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Playback: {}% vol, {} history, idle {}\n  \
            Voice: reconnect after {}, timeout {}\n  \
            Cache: {} entries, ttl {}\n  \
            Extraction: {} workers ({}, {})\n  \
            Data: {}\n  \
            Spotify: {}",
            self.default_volume,
            self.max_history_size,
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.reconnect_delay),
            humantime::format_duration(self.reconnect_timeout),
            self.max_cache_size,
            humantime::format_duration(self.cache_ttl),
            self.extraction_workers,
            self.ytdlp_path,
            self.ffmpeg_path,
            self.data_dir.display(),
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
        )
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Acepta `humantime` ("90s", "5m") o un número de segundos.
fn duration_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(raw) => {
            let raw = raw.trim();
            if let Ok(secs) = raw.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            humantime::parse_duration(raw)
                .with_context(|| format!("invalid duration for {}: '{}'", key, raw))
        }
        None => Ok(default),
    }
}

/// Constantes del motor por guild.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_volume: u8,
    pub max_history_size: usize,
    pub max_cache_size: usize,
    pub cache_ttl: Duration,
    /// Candidatos que `play_next` intenta antes de rendirse.
    pub max_skip_attempts: usize,
    pub resolve_attempts: u32,
    /// Espera antes del primer reintento; se duplica en cada intento.
    pub resolve_backoff: Duration,
    pub previous_attempts: u32,
    pub previous_retry_delay: Duration,
    pub seek_watchdog: Duration,
    pub reconnect_delay: Duration,
    pub reconnect_timeout: Duration,
    pub resume_delay: Duration,
    pub idle_timeout: Duration,
    pub save_debounce: Duration,
    pub now_playing_lock: Duration,
    pub message_validation_ttl: Duration,
    pub validation_retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_volume: 100,
            max_history_size: 30,
            max_cache_size: 500,
            cache_ttl: Duration::from_secs(3600),
            max_skip_attempts: 10,
            resolve_attempts: 3,
            resolve_backoff: Duration::from_secs(2),
            previous_attempts: 2,
            previous_retry_delay: Duration::from_millis(500),
            seek_watchdog: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(2),
            reconnect_timeout: Duration::from_secs(10),
            resume_delay: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(300),
            save_debounce: Duration::from_secs(1),
            now_playing_lock: Duration::from_secs(2),
            message_validation_ttl: Duration::from_secs(10),
            validation_retention: Duration::from_secs(60),
        }
    }
}

/// Intervalos de las tareas de mantenimiento.
#[derive(Debug, Clone)]
pub struct TimerSettings {
    pub idle_sweep: Duration,
    pub cache_sweep: Duration,
    pub guild_purge: Duration,
    pub now_playing: Duration,
    pub validation_sweep: Duration,
    pub voice_health: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            idle_sweep: Duration::from_secs(300),
            cache_sweep: Duration::from_secs(600),
            guild_purge: Duration::from_secs(3600),
            now_playing: Duration::from_secs(1),
            validation_sweep: Duration::from_secs(300),
            voice_health: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "token")])).unwrap();
        assert_eq!(config.default_volume, 100);
        assert_eq!(config.max_history_size, 30);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.reconnect_timeout, Duration::from_secs(10));
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.spotify_credentials().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_durations_accept_humantime_and_seconds() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("IDLE_TIMEOUT", "10m"),
            ("CACHE_TTL", "90"),
        ]))
        .unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.cache_ttl, Duration::from_secs(90));

        let settings = config.engine_settings();
        assert_eq!(settings.idle_timeout, Duration::from_secs(600));
        assert_eq!(settings.max_skip_attempts, 10);
    }

    #[test]
    fn test_missing_token_and_bad_values_fail() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), ("DEFAULT_VOLUME", "loud")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), ("IDLE_TIMEOUT", "soon")])).is_err());
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t")])).unwrap();
        config.default_volume = 150;
        assert!(config.validate().is_err());

        config.default_volume = 80;
        config.spotify_client_id = Some("id".into());
        assert!(config.validate().is_err());

        config.spotify_client_secret = Some("secret".into());
        config.validate().unwrap();
        assert!(config.summary().contains("Spotify: enabled"));
        assert!(!config.summary().contains("secret"));
    }
}
