//! Engine configuration.
//!
//! Settings come from the environment (the binary loads `.env` first via
//! `dotenvy`), with defaults suitable for local use. Builder-style setters
//! cover programmatic setups such as tests.

use chrono::format::{Item, StrftimeItems};
use tracing::warn;

#[cfg(feature = "database")]
use crate::database::DatabaseConfig;
use crate::error::{CommissionError, CommissionResult};

/// Configuration for the whole commission engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Background worker configuration.
    pub worker: WorkerConfig,

    /// Reconciliation sweep configuration.
    pub sweep: SweepConfig,

    /// CSV export configuration.
    pub export: ExportConfig,

    /// Connection settings (Postgres backend only).
    #[cfg(feature = "database")]
    pub database: DatabaseConfig,
}

impl EngineConfig {
    /// Read every section from environment variables.
    pub fn from_env() -> Self {
        Self {
            worker: WorkerConfig::from_env(),
            sweep: SweepConfig::from_env(),
            export: ExportConfig::from_env(),
            #[cfg(feature = "database")]
            database: DatabaseConfig::default(),
        }
    }

    /// Set the worker channel capacity.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.worker.buffer_size = size;
        self
    }

    /// Set how many payments a sweep reconciles at once.
    pub fn sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep.concurrency = concurrency;
        self
    }

    /// Set the export date format (chrono `strftime` syntax).
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.export.date_format = format.into();
        self
    }
}

/// Payment-success worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the trigger channel.
    ///
    /// Jobs that do not fit are dropped and left for the next sweep.
    pub buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            buffer_size: env_parse("COMMISSION_WORKER_BUFFER")
                .unwrap_or_else(|| Self::default().buffer_size),
        }
    }
}

/// Reconciliation sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Payments reconciled in parallel.
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

impl SweepConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: env_parse("COMMISSION_SWEEP_CONCURRENCY")
                .unwrap_or_else(|| Self::default().concurrency),
        }
    }
}

/// CSV export configuration.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// `strftime` format for the Date column.
    pub date_format: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl ExportConfig {
    /// Read `COMMISSION_EXPORT_DATE_FORMAT`, falling back to the default
    /// when it is unset or not a valid `strftime` format.
    pub fn from_env() -> Self {
        let Ok(date_format) = std::env::var("COMMISSION_EXPORT_DATE_FORMAT") else {
            return Self::default();
        };
        let config = Self { date_format };
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!(error = %e, "Ignoring COMMISSION_EXPORT_DATE_FORMAT");
                Self::default()
            }
        }
    }

    /// Reject formats chrono cannot render.
    pub fn validate(&self) -> CommissionResult<()> {
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(CommissionError::InvalidDateFormat {
                format: self.date_format.clone(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
