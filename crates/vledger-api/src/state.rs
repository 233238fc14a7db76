//! # Application State & Configuration
//!
//! [`AppConfig`] is read from environment variables with typed parsing.
//! [`AppState`] holds the shared [`LedgerEngine`], rebuilt from the journal
//! file on startup when `VLEDGER_JOURNAL_PATH` is set.
//!
//! | Variable                        | Default      |
//! |---------------------------------|--------------|
//! | `PORT`                          | 8080         |
//! | `AUTH_TOKEN`                    | unset (auth disabled) |
//! | `VLEDGER_JOURNAL_PATH`          | unset (in-memory journal) |
//! | `VLEDGER_WITHDRAWAL_MIN_AMOUNT` | 100          |
//! | `VLEDGER_DEFAULT_CASH_LIMIT`    | 500000       |
//! | `VLEDGER_CACHE_TTL_SECS`        | 30           |
//! | `VLEDGER_METRICS_ENABLED`       | true         |
//! | `VLEDGER_RATE_LIMIT_PER_MINUTE` | 1000 (0 disables) |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use vledger_core::Amount;
use vledger_ledger::{
    EngineConfig, FileJournal, JournalError, LedgerEngine, LedgerError, MemoryJournal,
};

use crate::error::AppError;

/// An environment variable held a value that could not be parsed.
#[derive(Error, Debug)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Failure to bring the ledger up at startup.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("cannot open journal: {0}")]
    Journal(#[from] JournalError),

    #[error("cannot replay journal: {0}")]
    Replay(#[from] LedgerError),
}

/// Service configuration.
///
/// Custom `Debug` redacts the auth token.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    /// Journal file. `None` keeps the journal in memory.
    pub journal_path: Option<PathBuf>,
    pub withdrawal_min_amount: Amount,
    pub default_cash_limit: Amount,
    pub cache_ttl: Duration,
    pub metrics_enabled: bool,
    pub rate_limit_per_minute: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("journal_path", &self.journal_path)
            .field("withdrawal_min_amount", &self.withdrawal_min_amount)
            .field("default_cash_limit", &self.default_cash_limit)
            .field("cache_ttl", &self.cache_ttl)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            port: 8080,
            auth_token: None,
            journal_path: None,
            withdrawal_min_amount: engine.withdrawal_min_amount,
            default_cash_limit: engine.default_cash_limit,
            cache_ttl: engine.cache_ttl,
            metrics_enabled: true,
            rate_limit_per_minute: 1000,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`. Unset and blank variables take
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let withdrawal_min_amount = parse_var(&get, "VLEDGER_WITHDRAWAL_MIN_AMOUNT")?
            .map(|units| positive_amount("VLEDGER_WITHDRAWAL_MIN_AMOUNT", units))
            .transpose()?
            .unwrap_or(defaults.withdrawal_min_amount);
        let default_cash_limit = parse_var(&get, "VLEDGER_DEFAULT_CASH_LIMIT")?
            .map(|units| non_negative_amount("VLEDGER_DEFAULT_CASH_LIMIT", units))
            .transpose()?
            .unwrap_or(defaults.default_cash_limit);
        let metrics_enabled = match get("VLEDGER_METRICS_ENABLED") {
            Some(v) => parse_bool("VLEDGER_METRICS_ENABLED", &v)?,
            None => defaults.metrics_enabled,
        };

        Ok(Self {
            port: parse_var(&get, "PORT")?.unwrap_or(defaults.port),
            auth_token: get("AUTH_TOKEN"),
            journal_path: get("VLEDGER_JOURNAL_PATH").map(PathBuf::from),
            withdrawal_min_amount,
            default_cash_limit,
            cache_ttl: parse_var(&get, "VLEDGER_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            metrics_enabled,
            rate_limit_per_minute: parse_var(&get, "VLEDGER_RATE_LIMIT_PER_MINUTE")?
                .unwrap_or(defaults.rate_limit_per_minute),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            withdrawal_min_amount: self.withdrawal_min_amount,
            default_cash_limit: self.default_cash_limit,
            cache_ttl: self.cache_ttl,
            ..EngineConfig::default()
        }
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError {
                var,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

fn positive_amount(var: &'static str, units: i64) -> Result<Amount, ConfigError> {
    Amount::positive(units).map_err(|e| ConfigError {
        var,
        value: units.to_string(),
        reason: e.to_string(),
    })
}

fn non_negative_amount(var: &'static str, units: i64) -> Result<Amount, ConfigError> {
    Amount::non_negative(units).map_err(|e| ConfigError {
        var,
        value: units.to_string(),
        reason: e.to_string(),
    })
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<LedgerEngine>,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::in_memory(AppConfig::default())
    }

    /// In-memory journal regardless of `journal_path`.
    pub fn in_memory(config: AppConfig) -> Self {
        let engine = LedgerEngine::new(config.engine_config(), Arc::new(MemoryJournal::new()));
        Self {
            engine: Arc::new(engine),
            config,
        }
    }

    /// Open the configured journal and replay it into a fresh engine.
    pub fn open(config: AppConfig) -> Result<Self, StartupError> {
        let Some(path) = config.journal_path.clone() else {
            return Ok(Self::in_memory(config));
        };
        let (journal, records) = FileJournal::open(&path)?;
        tracing::info!(path = %path.display(), records = records.len(), "journal opened");
        let engine = LedgerEngine::replay(config.engine_config(), Arc::new(journal), records)?;
        Ok(Self {
            engine: Arc::new(engine),
            config,
        })
    }

    /// Run a ledger mutation on the blocking pool. Mutations hold a vendor
    /// lock and fsync the journal, so they stay off the async workers.
    pub async fn run<R, F>(&self, op: F) -> Result<R, AppError>
    where
        R: Send + 'static,
        F: FnOnce(&LedgerEngine) -> Result<R, LedgerError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| AppError::Internal(format!("ledger task failed: {e}")))?
            .map_err(AppError::from)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
