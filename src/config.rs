use std::{collections::HashMap, env, net::SocketAddr, num::NonZeroUsize, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::{
    nav::{cache::WindowSettings, period::DatePeriod},
    sector::format::DEFAULT_EMBED_COLOR,
    util::retry::RetryConfig,
};

const DEFAULT_REFERENCE_DATE: &str = "2023-07-20T17:00:00Z";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    discord_token: String,
    discord_api_base_url: String,
    source_channel_id: u64,
    autopost_channel_ids: Vec<u64>,
    autopost_enabled: bool,
    autopost_delay: Duration,
    sheets_spreadsheet_id: String,
    sheets_api_key: Option<String>,
    sheets_api_base_url: String,
    sheets_range: String,
    sheets_cache_ttl: Duration,
    reference_date: DateTime<Utc>,
    period: Duration,
    history_len: NonZeroUsize,
    lookahead_len: NonZeroUsize,
    oracle_timeout: Duration,
    http_connect_timeout: Duration,
    http_total_timeout: Duration,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    glyphs: HashMap<String, String>,
    embed_color: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。
    ///
    /// # Errors
    /// 必須の環境変数が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("BEACON_HTTP_BIND", "0.0.0.0:9010")?;

        // Discord
        let discord_token = env_var("DISCORD_TOKEN")?;
        let discord_api_base_url = env::var("DISCORD_API_BASE_URL")
            .unwrap_or_else(|_| "https://discord.com/api/v10/".to_string());
        let source_channel_id = parse_required_u64("SOURCE_CHANNEL_ID")?;
        let autopost_channel_ids = parse_id_csv("AUTOPOST_CHANNEL_IDS")?;
        let autopost_enabled = parse_bool("AUTOPOST_ENABLED", true)?;
        let autopost_delay = parse_duration_secs("AUTOPOST_DELAY_SECS", 300)?;

        // Rotation sheet
        let sheets_spreadsheet_id = env_var("SHEETS_SPREADSHEET_ID")?;
        let sheets_api_key = env::var("SHEETS_API_KEY").ok().filter(|key| !key.is_empty());
        let sheets_api_base_url = env::var("SHEETS_API_BASE_URL")
            .unwrap_or_else(|_| "https://sheets.googleapis.com/v4/spreadsheets/".to_string());
        let sheets_range = env::var("SHEETS_RANGE").unwrap_or_else(|_| "Rotation!A2:J".to_string());
        let sheets_cache_ttl = parse_duration_secs("SHEETS_CACHE_TTL_SECS", 300)?;

        // Window
        let reference_date = parse_datetime("REFERENCE_DATE", DEFAULT_REFERENCE_DATE)?;
        let period = parse_duration_secs("PERIOD_SECS", 86_400)?;
        if period.is_zero() {
            return Err(ConfigError::Invalid {
                name: "PERIOD_SECS",
                source: anyhow::anyhow!("period must be greater than zero"),
            });
        }
        if autopost_delay >= period {
            return Err(ConfigError::Invalid {
                name: "AUTOPOST_DELAY_SECS",
                source: anyhow::anyhow!("delay must be shorter than the period"),
            });
        }
        let history_len = parse_non_zero_usize("HISTORY_LEN", 14)?;
        let lookahead_len = parse_non_zero_usize("LOOKAHEAD_LEN", 7)?;
        let oracle_timeout = parse_duration_ms("ORACLE_TIMEOUT_MS", 10_000)?;

        // HTTP timeout / retry settings
        let http_connect_timeout = parse_duration_ms("HTTP_CONNECT_TIMEOUT_MS", 3000)?;
        let http_total_timeout = parse_duration_ms("HTTP_TOTAL_TIMEOUT_MS", 30_000)?;
        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10_000)?;

        // Presentation
        let glyphs = parse_glyphs("GLYPHS_JSON")?;
        let embed_color = parse_hex_color("EMBED_COLOR", DEFAULT_EMBED_COLOR)?;

        Ok(Self {
            http_bind,
            discord_token,
            discord_api_base_url,
            source_channel_id,
            autopost_channel_ids,
            autopost_enabled,
            autopost_delay,
            sheets_spreadsheet_id,
            sheets_api_key,
            sheets_api_base_url,
            sheets_range,
            sheets_cache_ttl,
            reference_date,
            period,
            history_len,
            lookahead_len,
            oracle_timeout,
            http_connect_timeout,
            http_total_timeout,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            glyphs,
            embed_color,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn discord_token(&self) -> &str {
        &self.discord_token
    }

    #[must_use]
    pub fn discord_api_base_url(&self) -> &str {
        &self.discord_api_base_url
    }

    #[must_use]
    pub fn source_channel_id(&self) -> u64 {
        self.source_channel_id
    }

    #[must_use]
    pub fn autopost_channel_ids(&self) -> &[u64] {
        &self.autopost_channel_ids
    }

    #[must_use]
    pub fn autopost_enabled(&self) -> bool {
        self.autopost_enabled
    }

    #[must_use]
    pub fn autopost_delay(&self) -> Duration {
        self.autopost_delay
    }

    #[must_use]
    pub fn sheets_spreadsheet_id(&self) -> &str {
        &self.sheets_spreadsheet_id
    }

    #[must_use]
    pub fn sheets_api_key(&self) -> Option<&str> {
        self.sheets_api_key.as_deref()
    }

    #[must_use]
    pub fn sheets_api_base_url(&self) -> &str {
        &self.sheets_api_base_url
    }

    #[must_use]
    pub fn sheets_range(&self) -> &str {
        &self.sheets_range
    }

    #[must_use]
    pub fn sheets_cache_ttl(&self) -> Duration {
        self.sheets_cache_ttl
    }

    #[must_use]
    pub fn reference_date(&self) -> DateTime<Utc> {
        self.reference_date
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn history_len(&self) -> NonZeroUsize {
        self.history_len
    }

    #[must_use]
    pub fn lookahead_len(&self) -> NonZeroUsize {
        self.lookahead_len
    }

    #[must_use]
    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    #[must_use]
    pub fn http_connect_timeout(&self) -> Duration {
        self.http_connect_timeout
    }

    #[must_use]
    pub fn http_total_timeout(&self) -> Duration {
        self.http_total_timeout
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn glyphs(&self) -> &HashMap<String, String> {
        &self.glyphs
    }

    #[must_use]
    pub fn embed_color(&self) -> u32 {
        self.embed_color
    }

    /// HTTP クライアント共通の再試行設定。`HTTP_MAX_RETRIES` は初回を含まない回数。
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.http_max_retries.saturating_add(1),
            self.http_backoff_base_ms,
            self.http_backoff_cap_ms,
        )
    }

    /// ウィンドウ設定を組み立てる。
    ///
    /// # Errors
    /// 周期長が `TimeDelta` で表現できない場合はエラーを返す。
    pub fn window_settings(&self) -> Result<WindowSettings, ConfigError> {
        let invalid_period = |source: anyhow::Error| ConfigError::Invalid {
            name: "PERIOD_SECS",
            source,
        };
        let period = TimeDelta::from_std(self.period).map_err(|error| invalid_period(error.into()))?;
        let period =
            DatePeriod::new(self.reference_date, period).map_err(|error| invalid_period(error.into()))?;

        Ok(WindowSettings {
            period,
            history_len: self.history_len.get(),
            lookahead_len: self.lookahead_len.get(),
            oracle_timeout: self.oracle_timeout,
        })
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_required_u64(name: &'static str) -> Result<u64, ConfigError> {
    let raw = env_var(name)?;
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("value must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_u64(name, default_secs)?))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_u64(name, default_ms)?))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

fn parse_datetime(name: &'static str, default: &str) -> Result<DateTime<Utc>, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })
}

fn parse_id_csv(name: &'static str) -> Result<Vec<u64>, ConfigError> {
    let raw = env::var(name).unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|error| ConfigError::Invalid {
                name,
                source: anyhow::Error::new(error),
            })
        })
        .collect()
}

fn parse_glyphs(name: &'static str) -> Result<HashMap<String, String>, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| "{}".to_string());
    serde_json::from_str(&raw).map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_hex_color(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    let digits = raw.trim().trim_start_matches('#').trim_start_matches("0x");
    let color = u32::from_str_radix(digits, 16).map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if color > 0x00FF_FFFF {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("color must fit in 24 bits"),
        });
    }
    Ok(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [(&str, Option<&str>); 3] = [
        ("DISCORD_TOKEN", Some("token")),
        ("SOURCE_CHANNEL_ID", Some("1130000000000000001")),
        ("SHEETS_SPREADSHEET_ID", Some("sheet-1")),
    ];

    const OPTIONAL: [&str; 12] = [
        "AUTOPOST_CHANNEL_IDS",
        "AUTOPOST_ENABLED",
        "AUTOPOST_DELAY_SECS",
        "SHEETS_API_KEY",
        "REFERENCE_DATE",
        "PERIOD_SECS",
        "HISTORY_LEN",
        "LOOKAHEAD_LEN",
        "HTTP_MAX_RETRIES",
        "GLYPHS_JSON",
        "EMBED_COLOR",
        "BEACON_HTTP_BIND",
    ];

    fn with_env<R>(overrides: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED.to_vec();
        vars.extend(OPTIONAL.iter().map(|name| (*name, None)));
        for (name, value) in overrides {
            vars.retain(|(existing, _)| existing != name);
            vars.push((*name, *value));
        }
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn from_env_uses_defaults() {
        let config = with_env(&[], Config::from_env).expect("config should load");

        assert_eq!(config.http_bind(), "0.0.0.0:9010".parse().unwrap());
        assert_eq!(config.discord_api_base_url(), "https://discord.com/api/v10/");
        assert_eq!(config.source_channel_id(), 1_130_000_000_000_000_001);
        assert!(config.autopost_channel_ids().is_empty());
        assert!(config.autopost_enabled());
        assert_eq!(config.autopost_delay(), Duration::from_secs(300));
        assert_eq!(config.sheets_api_key(), None);
        assert_eq!(config.sheets_range(), "Rotation!A2:J");
        assert_eq!(
            config.reference_date(),
            DateTime::parse_from_rfc3339(DEFAULT_REFERENCE_DATE).unwrap()
        );
        assert_eq!(config.period(), Duration::from_secs(86_400));
        assert_eq!(config.history_len().get(), 14);
        assert_eq!(config.lookahead_len().get(), 7);
        assert_eq!(config.embed_color(), DEFAULT_EMBED_COLOR);
        assert!(config.glyphs().is_empty());
        assert_eq!(config.retry_config(), RetryConfig::new(4, 250, 10_000));
    }

    #[test]
    fn from_env_overrides_values() {
        let config = with_env(
            &[
                ("AUTOPOST_CHANNEL_IDS", Some("10, 20,,30")),
                ("AUTOPOST_ENABLED", Some("off")),
                ("SHEETS_API_KEY", Some("key-1")),
                ("HISTORY_LEN", Some("5")),
                ("LOOKAHEAD_LEN", Some("3")),
                ("GLYPHS_JSON", Some(r#"{"Solar": "<:solar:1>"}"#)),
                ("EMBED_COLOR", Some("#00ff00")),
                ("BEACON_HTTP_BIND", Some("127.0.0.1:8088")),
            ],
            Config::from_env,
        )
        .expect("config should load");

        assert_eq!(config.autopost_channel_ids(), &[10, 20, 30]);
        assert!(!config.autopost_enabled());
        assert_eq!(config.sheets_api_key(), Some("key-1"));
        assert_eq!(config.history_len().get(), 5);
        assert_eq!(config.lookahead_len().get(), 3);
        assert_eq!(config.glyphs().get("Solar").map(String::as_str), Some("<:solar:1>"));
        assert_eq!(config.embed_color(), 0x00_FF00);
        assert_eq!(config.http_bind(), "127.0.0.1:8088".parse().unwrap());

        let settings = config.window_settings().expect("settings");
        assert_eq!(settings.history_len, 5);
        assert_eq!(settings.period.period(), TimeDelta::days(1));
    }

    #[test]
    fn from_env_errors_when_required_missing() {
        let error = with_env(&[("DISCORD_TOKEN", None)], Config::from_env)
            .expect_err("missing token should fail");

        assert!(matches!(error, ConfigError::Missing("DISCORD_TOKEN")));
    }

    #[test]
    fn zero_history_len_is_rejected() {
        let error = with_env(&[("HISTORY_LEN", Some("0"))], Config::from_env)
            .expect_err("zero history should fail");

        assert!(matches!(error, ConfigError::Invalid { name: "HISTORY_LEN", .. }));
    }

    #[test]
    fn delay_longer_than_period_is_rejected() {
        let error = with_env(
            &[("PERIOD_SECS", Some("600")), ("AUTOPOST_DELAY_SECS", Some("900"))],
            Config::from_env,
        )
        .expect_err("delay past the period should fail");

        assert!(matches!(error, ConfigError::Invalid { name: "AUTOPOST_DELAY_SECS", .. }));
    }

    #[test]
    fn invalid_channel_id_is_rejected() {
        let error = with_env(&[("AUTOPOST_CHANNEL_IDS", Some("10,abc"))], Config::from_env)
            .expect_err("non-numeric id should fail");

        assert!(matches!(error, ConfigError::Invalid { name: "AUTOPOST_CHANNEL_IDS", .. }));
    }
}
