//! PostgreSQL connection pool for the metadata store.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use coffer_core::defaults::{self, env_parse};
use coffer_core::StoreError;

/// Sizing and lifetime limits for the metadata pool.
///
/// Each metadata call also carries its own deadline, so `acquire_timeout`
/// only bounds how long a caller queues for a connection.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they fail.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            min_connections: defaults::DB_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(defaults::DB_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `DB_MAX_CONNECTIONS` and `DB_MIN_CONNECTIONS`.
    /// The minimum never exceeds the maximum.
    pub fn from_env() -> Self {
        let max_connections =
            env_parse(defaults::ENV_DB_MAX_CONNECTIONS, defaults::DB_MAX_CONNECTIONS).max(1);
        let min_connections =
            env_parse(defaults::ENV_DB_MIN_CONNECTIONS, defaults::DB_MIN_CONNECTIONS)
                .min(max_connections);
        Self {
            max_connections,
            min_connections,
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn options(&self) -> PgPoolOptions {
        let options = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout);
        match self.max_lifetime {
            Some(lifetime) => options.max_lifetime(lifetime),
            None => options,
        }
    }
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool, StoreError> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(
    database_url: &str,
    config: PoolConfig,
) -> Result<PgPool, StoreError> {
    let start = Instant::now();
    let pool = config.options().connect(database_url).await?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Metadata pool connected"
    );
    Ok(pool)
}
