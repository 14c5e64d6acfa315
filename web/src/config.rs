//! Mount configuration.
//!
//! Loads from environment variables with sensible defaults, or is built in
//! code with [`MountConfig::builder`].
//!
//! | Variable | Default |
//! |---|---|
//! | `PORTICO_ETAG` | `true` |
//! | `PORTICO_CATCH_PANICS` | `true` |
//! | `PORTICO_QUERY_DEPTH` | `5` |
//! | `PORTICO_QUERY_ARRAY_LIMIT` | `20` |
//! | `PORTICO_QUERY_PARAMETER_LIMIT` | `1000` |
//! | `PORTICO_QUERY_ALLOW_DOTS` | `true` |

use crate::error::ConfigError;
use crate::reporter::FaultSink;
use portico_core::environment::{Clock, FaultReporter, SystemClock};
use portico_core::query::QueryOptions;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration shared by every request of one mounted handler.
#[derive(Clone)]
pub struct MountConfig {
    /// Where observed failures are reported.
    pub reporter: Arc<dyn FaultReporter>,
    /// Source of report timestamps.
    pub clock: Arc<dyn Clock>,
    /// Querystring parsing limits.
    pub query: QueryOptions,
    /// Fingerprint buffered responses and answer `If-None-Match`.
    pub etag: bool,
    /// Turn handler panics into 500 responses.
    pub catch_panics: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            reporter: FaultSink::global(),
            clock: Arc::new(SystemClock),
            query: QueryOptions::default(),
            etag: true,
            catch_panics: true,
        }
    }
}

impl fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountConfig")
            .field("query", &self.query)
            .field("etag", &self.etag)
            .field("catch_panics", &self.catch_panics)
            .finish_non_exhaustive()
    }
}

impl MountConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn builder() -> MountConfigBuilder {
        MountConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but cannot be
    /// parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but cannot be
    /// parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let query = QueryOptions {
            depth: parse_var(&lookup, "PORTICO_QUERY_DEPTH", defaults.query.depth)?,
            array_limit: parse_var(&lookup, "PORTICO_QUERY_ARRAY_LIMIT", defaults.query.array_limit)?,
            parameter_limit: parse_var(
                &lookup,
                "PORTICO_QUERY_PARAMETER_LIMIT",
                defaults.query.parameter_limit,
            )?,
            allow_dots: parse_flag(&lookup, "PORTICO_QUERY_ALLOW_DOTS", defaults.query.allow_dots)?,
        };

        Ok(Self {
            query,
            etag: parse_flag(&lookup, "PORTICO_ETAG", defaults.etag)?,
            catch_panics: parse_flag(&lookup, "PORTICO_CATCH_PANICS", defaults.catch_panics)?,
            ..defaults
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}

/// Builder for [`MountConfig`].
#[derive(Debug)]
pub struct MountConfigBuilder {
    config: MountConfig,
}

impl MountConfigBuilder {
    /// Report observed failures here instead of the process-wide sink.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn FaultReporter>) -> Self {
        self.config.reporter = reporter;
        self
    }

    /// Timestamp reports with this clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    /// Querystring parsing limits.
    #[must_use]
    pub const fn query(mut self, query: QueryOptions) -> Self {
        self.config.query = query;
        self
    }

    /// Enable or disable conditional caching.
    #[must_use]
    pub const fn etag(mut self, etag: bool) -> Self {
        self.config.etag = etag;
        self
    }

    /// Enable or disable panic recovery.
    #[must_use]
    pub const fn catch_panics(mut self, catch_panics: bool) -> Self {
        self.config.catch_panics = catch_panics;
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> MountConfig {
        self.config
    }
}
