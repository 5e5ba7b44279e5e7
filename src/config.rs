use anyhow::{Context, Result};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // Discord
    #[serde(skip_serializing)]
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Descargas
    pub download_dir: PathBuf,
    #[serde(with = "duration_format")]
    pub download_timeout: Duration,
    pub ytdlp_path: String,
    pub spotdl_path: String,

    // Límites
    #[serde(with = "duration_format")]
    pub play_cooldown: Duration,
    #[serde(with = "duration_format")]
    pub reap_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create the download directory if it doesn't exist
        std::fs::create_dir_all(&config.download_dir).with_context(|| {
            format!("No se pudo crear {}", config.download_dir.display())
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Builds the configuration from a variable lookup, applying defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let duration = |key: &str, default: &str| -> Result<Duration> {
            let raw = var(key, default);
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("{} no es una duración válida: {}", key, raw))
        };

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN")
                .filter(|token| !token.trim().is_empty())
                .context("DISCORD_TOKEN no está definido")?,
            command_prefix: var("COMMAND_PREFIX", "."),

            // Audio
            default_volume: var("DEFAULT_VOLUME", "0.25")
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_queue_size: var("MAX_QUEUE_SIZE", "100")
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,

            // Descargas
            download_dir: var("DOWNLOAD_DIR", "./downloads").into(),
            download_timeout: duration("DOWNLOAD_TIMEOUT", "5m")?,
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),
            spotdl_path: var("SPOTDL_PATH", "spotdl"),

            // Límites
            play_cooldown: duration("PLAY_COOLDOWN", "25s")?,
            reap_interval: duration("REAP_INTERVAL", "60s")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and reap interval must be greater than zero
    /// - The command prefix must not contain whitespace
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.reap_interval.is_zero() {
            anyhow::bail!("Reap interval must be greater than 0");
        }

        if self.download_timeout.is_zero() {
            anyhow::bail!("Download timeout must be greater than 0");
        }

        if self.command_prefix.is_empty() || self.command_prefix.contains(char::is_whitespace) {
            anyhow::bail!(
                "Command prefix must be non-empty without spaces, got: {:?}",
                self.command_prefix
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Audio: {}% vol, {} max queue\n  \
            Downloads: {} (timeout {})\n  \
            Limits: {} play cooldown, {} reap interval",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.download_dir.display(),
            humantime::format_duration(self.download_timeout),
            humantime::format_duration(self.play_cooldown),
            humantime::format_duration(self.reap_interval),
        )
    }
}

/// Serializes durations in humantime notation ("25s", "5m")
mod duration_format {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_token_is_set() {
        let config = config_from(&[("DISCORD_TOKEN", "secret")]).unwrap();

        assert_eq!(config.command_prefix, ".");
        assert_eq!(config.download_dir, PathBuf::from("./downloads"));
        assert_eq!(config.play_cooldown, Duration::from_secs(25));
        assert_eq!(config.reap_interval, Duration::from_secs(60));
        assert_eq!(config.download_timeout, Duration::from_secs(300));
        assert_eq!(config.default_volume, 0.25);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.spotdl_path, "spotdl");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_humantime_durations_are_parsed() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "secret"),
            ("PLAY_COOLDOWN", "1m 30s"),
            ("REAP_INTERVAL", "5s"),
        ])
        .unwrap();

        assert_eq!(config.play_cooldown, Duration::from_secs(90));
        assert_eq!(config.reap_interval, Duration::from_secs(5));
        assert!(config_from(&[("DISCORD_TOKEN", "t"), ("REAP_INTERVAL", "soon")]).is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let loud = config_from(&[("DISCORD_TOKEN", "t"), ("DEFAULT_VOLUME", "3.0")]).unwrap();
        assert!(loud.validate().is_err());

        let spaced = config_from(&[("DISCORD_TOKEN", "t"), ("COMMAND_PREFIX", "! ")]).unwrap();
        assert!(spaced.validate().is_err());

        let no_queue = config_from(&[("DISCORD_TOKEN", "t"), ("MAX_QUEUE_SIZE", "0")]).unwrap();
        assert!(no_queue.validate().is_err());
    }

    #[test]
    fn test_summary_never_contains_token() {
        let config = config_from(&[("DISCORD_TOKEN", "super-secret-token")]).unwrap();
        let summary = config.summary();

        assert!(!summary.contains("super-secret-token"));
        assert!(summary.contains("25s"));
        assert!(!serde_json::to_string(&config)
            .unwrap()
            .contains("super-secret-token"));
    }
}
