use std::path::PathBuf;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::fetcher::{FetcherOptions, RetryPolicy};
use crate::site::Site;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Http,
    Spider,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub source: SourceKind,
    pub calls_per_second: f64,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub retry_attempts: u32,
    pub retry_wait_min_secs: u64,
    pub retry_wait_max_secs: u64,
    pub retry_multiplier: f64,
    pub min_fields_filled: f64,
    pub year_buffer: i32,
    pub min_movies: usize,
    pub gratis_url: String,
    pub comando_url: String,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("db_path", "data/filmes.sqlite")?
        .set_default("source", "http")?
        .set_default("calls_per_second", 1.0)?
        .set_default("request_timeout_secs", 40)?
        .set_default("cache_ttl_secs", 3600)?
        .set_default("retry_attempts", 3)?
        .set_default("retry_wait_min_secs", 4)?
        .set_default("retry_wait_max_secs", 10)?
        .set_default("retry_multiplier", 1.0)?
        .set_default("min_fields_filled", 0.7)?
        .set_default("year_buffer", 10)?
        .set_default("min_movies", 10)?
        .set_default("gratis_url", "https://gratistorrent.com/lancamentos/")?
        .set_default("comando_url", "https://comando.la/category/filmes/")
}

impl Settings {
    /// Defaults, then `filmes.toml` if present, then `FILMES_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name("filmes").required(false))
            .add_source(Environment::with_prefix("FILMES").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn listing_url(&self, site: Site) -> &str {
        match site {
            Site::Gratis => &self.gratis_url,
            Site::Comando => &self.comando_url,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetcher_options(&self) -> FetcherOptions {
        FetcherOptions {
            calls_per_second: self.calls_per_second,
            timeout: self.request_timeout(),
            cache_ttl: self.cache_ttl(),
            retry: RetryPolicy {
                attempts: self.retry_attempts.max(1),
                multiplier: self.retry_multiplier,
                min_wait: Duration::from_secs(self.retry_wait_min_secs),
                max_wait: Duration::from_secs(self.retry_wait_max_secs.max(self.retry_wait_min_secs)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let s: Settings = defaults().unwrap().build().unwrap().try_deserialize().unwrap();
        assert_eq!(s.db_path, PathBuf::from("data/filmes.sqlite"));
        assert_eq!(s.source, SourceKind::Http);
        assert_eq!(s.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(s.listing_url(Site::Comando), "https://comando.la/category/filmes/");

        let opts = s.fetcher_options();
        assert_eq!(opts.retry.attempts, 3);
        assert_eq!(opts.retry.min_wait, Duration::from_secs(4));
        assert_eq!(opts.retry.max_wait, Duration::from_secs(10));
        assert_eq!(opts.timeout, Duration::from_secs(40));
    }

    #[test]
    fn overrides_take_precedence() {
        let s: Settings = defaults()
            .unwrap()
            .set_override("source", "spider")
            .unwrap()
            .set_override("calls_per_second", 0.5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.source, SourceKind::Spider);
        assert_eq!(s.calls_per_second, 0.5);
    }
}
