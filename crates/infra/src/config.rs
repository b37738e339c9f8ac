//! Configuration loading and representation.
//!
//! Sources, later ones overriding earlier ones:
//! 1. defaults in code
//! 2. an optional `pharmastock.toml` (or `.yaml`/`.json`) next to the process
//! 3. environment variables prefixed with `PHARMASTOCK__`, e.g.
//!    `PHARMASTOCK__DATABASE__URL` or `PHARMASTOCK__PAGINATION__EXITS_PAGE_SIZE`

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::repositories::Pagination;

const ENV_PREFIX: &str = "PHARMASTOCK";
const DEFAULT_FILE: &str = "pharmastock";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Use Postgres instead of the in-memory store.
    pub use_persistent: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub exits_page_size: u32,
    pub entries_page_size: u32,
    pub medicine_stocks_page_size: u32,
    pub dispensations_page_size: u32,
}

impl PaginationConfig {
    pub fn exits(&self, page: u32) -> Pagination {
        Pagination::new(page, self.exits_page_size)
    }

    pub fn entries(&self, page: u32) -> Pagination {
        Pagination::new(page, self.entries_page_size)
    }

    pub fn medicine_stocks(&self, page: u32) -> Pagination {
        Pagination::new(page, self.medicine_stocks_page_size)
    }

    pub fn dispensations(&self, page: u32) -> Pagination {
        Pagination::new(page, self.dispensations_page_size)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/pharmastock".to_string(),
            max_connections: 10,
            min_connections: 1,
            use_persistent: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            exits_page_size: 10,
            entries_page_size: 10,
            medicine_stocks_page_size: 10,
            dispensations_page_size: 20,
        }
    }
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl InfraConfig {
    /// Load configuration from defaults, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name(DEFAULT_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, overlaid with a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Install the process-wide tracing subscriber using `log.filter`.
    pub fn init_tracing(&self) {
        pharmastock_observability::init_with_filter(&self.log.filter);
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
            .set_default("database.min_connections", i64::from(defaults.database.min_connections))?
            .set_default("database.use_persistent", defaults.database.use_persistent)?
            .set_default("log.filter", defaults.log.filter)?
            .set_default("pagination.exits_page_size", i64::from(defaults.pagination.exits_page_size))?
            .set_default("pagination.entries_page_size", i64::from(defaults.pagination.entries_page_size))?
            .set_default(
                "pagination.medicine_stocks_page_size",
                i64::from(defaults.pagination.medicine_stocks_page_size),
            )?
            .set_default(
                "pagination.dispensations_page_size",
                i64::from(defaults.pagination.dispensations_page_size),
            )
    }
}
