//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::sql::RelaxedReads;

pub use cli::{
    CliArgs, Command, DatabaseOverride, LoggingOverrides, PrewarmArgs, RewriteArgs, StatsArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ppreporter";
const ENV_PREFIX: &str = "PPREPORTER";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_PREWARM_STARTUP_DELAY_SECS: u64 = 5;
const DEFAULT_PREWARM_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_TODAY_TTL_SECS: u64 = 15 * 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub isolation: IsolationSettings,
    pub prewarm: PrewarmSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl: Duration,
    /// `None` disables caching of "not found" results.
    pub negative_ttl: Option<Duration>,
    pub max_entries: NonZeroUsize,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct IsolationSettings {
    pub strategy: RelaxedReads,
}

#[derive(Debug, Clone)]
pub struct PrewarmSettings {
    pub enabled: bool,
    pub startup_delay: Duration,
    pub refresh_interval: Duration,
    pub today_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_logging_overrides(&cli.logging);
    match &cli.command {
        Command::Rewrite(_) => {}
        Command::Prewarm(args) => raw.apply_database_override(&args.database),
        Command::Stats(args) => raw.apply_database_override(&args.database),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    isolation: RawIsolationSettings,
    prewarm: RawPrewarmSettings,
}

impl RawSettings {
    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            isolation,
            prewarm,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            isolation: build_isolation_settings(isolation)?,
            prewarm: build_prewarm_settings(prewarm)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let default_ttl = positive_seconds(
        cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.default_ttl_seconds",
    )?;

    let negative_ttl = match cache.negative_ttl_seconds.unwrap_or(0) {
        0 => None,
        seconds => Some(Duration::from_secs(seconds)),
    };

    let max_entries_value = cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
    let max_entries = usize::try_from(max_entries_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.max_entries",
                "must be greater than zero and fit in usize",
            )
        })?;

    let sweep_interval = positive_seconds(
        cache
            .sweep_interval_seconds
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        "cache.sweep_interval_seconds",
    )?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_ttl,
        negative_ttl,
        max_entries,
        sweep_interval,
    })
}

fn build_isolation_settings(
    isolation: RawIsolationSettings,
) -> Result<IsolationSettings, LoadError> {
    let strategy = match isolation.strategy {
        Some(value) => RelaxedReads::from_str(&value)
            .map_err(|reason| LoadError::invalid("isolation.strategy", reason))?,
        None => RelaxedReads::default(),
    };

    Ok(IsolationSettings { strategy })
}

fn build_prewarm_settings(prewarm: RawPrewarmSettings) -> Result<PrewarmSettings, LoadError> {
    let startup_delay = Duration::from_secs(
        prewarm
            .startup_delay_seconds
            .unwrap_or(DEFAULT_PREWARM_STARTUP_DELAY_SECS),
    );
    let refresh_interval = positive_seconds(
        prewarm
            .refresh_interval_seconds
            .unwrap_or(DEFAULT_PREWARM_REFRESH_INTERVAL_SECS),
        "prewarm.refresh_interval_seconds",
    )?;
    let today_ttl = positive_seconds(
        prewarm.today_ttl_seconds.unwrap_or(DEFAULT_TODAY_TTL_SECS),
        "prewarm.today_ttl_seconds",
    )?;

    Ok(PrewarmSettings {
        enabled: prewarm.enabled.unwrap_or(true),
        startup_delay,
        refresh_interval,
        today_ttl,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_seconds: Option<u64>,
    negative_ttl_seconds: Option<u64>,
    max_entries: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIsolationSettings {
    strategy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPrewarmSettings {
    enabled: Option<bool>,
    startup_delay_seconds: Option<u64>,
    refresh_interval_seconds: Option<u64>,
    today_ttl_seconds: Option<u64>,
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
