use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::logging::LogFormat;
use crate::promotions::DiscountWindow;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CACHE_TTL_SECS: usize = 60;
const DEFAULT_MEDIA_ROOT: &str = "media";
const DEFAULT_MEDIA_URL: &str = "/media/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Catalog caching is off when unset.
    pub redis_url: Option<String>,
    pub catalog_cache_ttl_secs: usize,
    pub media_root: PathBuf,
    pub media_url: String,
    pub discount_window: DiscountWindow,
    pub log_format: LogFormat,
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: err.to_string(),
        }),
    }
}

impl Settings {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        Ok(Settings {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parsed(&lookup, "PORT", DEFAULT_PORT)?,
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            catalog_cache_ttl_secs: parsed(&lookup, "CATALOG_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            media_root: lookup("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            media_url: lookup("MEDIA_URL").unwrap_or_else(|| DEFAULT_MEDIA_URL.to_string()),
            discount_window: parsed(&lookup, "DISCOUNT_WINDOW", DiscountWindow::default())?,
            log_format: parsed(&lookup, "LOG_FORMAT", LogFormat::default())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let settings = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/store")])).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.redis_url, None);
        assert_eq!(settings.discount_window, DiscountWindow::Legacy);
        assert_eq!(settings.media_root, PathBuf::from("media"));
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            Settings::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_parse() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/store"),
            ("PORT", "9000"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("DISCOUNT_WINDOW", "containing"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(settings.discount_window, DiscountWindow::Containing);
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_values_name_the_key() {
        let err = Settings::from_lookup(lookup(&[("DATABASE_URL", "x"), ("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }
}
