use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub grouping: GroupingSettings,
    pub deletion: DeletionSettings,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Tuning knobs for the grouping pipeline
#[derive(Debug, Clone)]
pub struct GroupingSettings {
    /// Fraction of events (0.0 - 1.0) also run through the background
    /// grouping config for comparison metrics
    pub background_sample_rate: f64,
}

/// Tuning knobs for group deletion scheduling
#[derive(Debug, Clone)]
pub struct DeletionSettings {
    /// Number of group ids carried by each async deletion task
    pub group_chunk_size: usize,
    /// Default grace period before a scheduled deletion fires
    pub schedule_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            grouping: GroupingSettings::from_env(),
            deletion: DeletionSettings::from_env(),
        })
    }
}

impl GroupingSettings {
    pub fn from_env() -> Self {
        Self {
            background_sample_rate: env::var("BACKGROUND_GROUPING_SAMPLE_RATE")
                .unwrap_or_else(|_| "0.0".to_string())
                .parse()
                .unwrap_or(0.0),
        }
    }
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            background_sample_rate: 0.0,
        }
    }
}

impl DeletionSettings {
    pub fn from_env() -> Self {
        Self {
            group_chunk_size: env::var("GROUP_DELETION_CHUNK_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            schedule_days: env::var("DELETION_SCHEDULE_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        }
    }
}

impl Default for DeletionSettings {
    fn default() -> Self {
        Self {
            group_chunk_size: 100,
            schedule_days: 30,
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            acquire_timeout: Duration::from_secs(
                env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),
            idle_timeout: Duration::from_secs(
                env::var("DATABASE_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                env::var("DATABASE_MAX_LIFETIME_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
            ),
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingDatabaseUrl,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
