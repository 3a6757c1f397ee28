//! Configuration management for the warehouse engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with WHE_ prefix

use std::collections::HashMap;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::taxonomy::ValueRanking;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Stock ledger and regeneration tuning
    pub inventory: InventoryConfig,

    pub taxonomy: TaxonomyConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Items per transaction during bulk SKU regeneration
    pub regeneration_chunk_size: u32,

    /// Retries for a stock write rolled back by a serialization failure
    pub max_conflict_retries: u32,

    pub default_low_stock_threshold: i32,

    pub default_critical_stock_threshold: i32,

    /// Zero-quantity items untouched for this long are archived by the
    /// stale-item sweep
    pub stale_archive_days: i64,

    /// Default unit for new items
    pub default_unit: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaxonomyConfig {
    /// Value order per type slug; replaces the built-in size/quality order
    /// for the slugs it names
    #[serde(default)]
    pub orderings: HashMap<String, Vec<String>>,

    /// Load the built-in seed values
    #[serde(default = "default_true")]
    pub builtin_seeds: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format
    pub json: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("WHE_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let defaults = Config::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("server.host", defaults.server.host)?
            .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
            .set_default("database.min_connections", i64::from(defaults.database.min_connections))?
            .set_default("jwt.access_token_expiry", defaults.jwt.access_token_expiry)?
            .set_default(
                "inventory.regeneration_chunk_size",
                i64::from(defaults.inventory.regeneration_chunk_size),
            )?
            .set_default(
                "inventory.max_conflict_retries",
                i64::from(defaults.inventory.max_conflict_retries),
            )?
            .set_default(
                "inventory.default_low_stock_threshold",
                i64::from(defaults.inventory.default_low_stock_threshold),
            )?
            .set_default(
                "inventory.default_critical_stock_threshold",
                i64::from(defaults.inventory.default_critical_stock_threshold),
            )?
            .set_default("inventory.stale_archive_days", defaults.inventory.stale_archive_days)?
            .set_default("inventory.default_unit", defaults.inventory.default_unit)?
            .set_default("taxonomy.builtin_seeds", true)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WHE_ prefix)
            .add_source(
                Environment::with_prefix("WHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Built-in value order overlaid with configured orderings
    pub fn value_ranking(&self) -> ValueRanking {
        let mut ranking = ValueRanking::default();
        for (slug, names) in &self.taxonomy.orderings {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            ranking = ranking.with(slug, &names);
        }
        ranking
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/warehouse".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            jwt: JwtConfig {
                secret: "development-secret-key".to_string(),
                access_token_expiry: 3600,
            },
            inventory: InventoryConfig {
                regeneration_chunk_size: 200,
                max_conflict_retries: 3,
                default_low_stock_threshold: 10,
                default_critical_stock_threshold: 0,
                stale_archive_days: 90,
                default_unit: "шт".to_string(),
            },
            taxonomy: TaxonomyConfig {
                orderings: HashMap::new(),
                builtin_seeds: true,
            },
            logging: LoggingConfig { json: false },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
