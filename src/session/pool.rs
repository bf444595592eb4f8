use crate::config::Config;
use crate::{ColdQueryError, Result};
use deadpool_postgres::{
    Config as PoolSettings, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use futures::future::try_join_all;
use serde::Serialize;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Bounded set of physical PostgreSQL connections shared by the whole process
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool,
    min_size: usize,
}

/// Point-in-time view of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

impl ConnectionPool {
    /// Build the pool without opening any connection
    pub fn new(config: &Config) -> Result<Self> {
        let mut settings = PoolSettings::new();
        match &config.database_url {
            Some(url) => settings.url = Some(url.clone()),
            None => {
                settings.host = Some(config.db_host.clone());
                settings.port = Some(config.db_port);
                settings.user = Some(config.db_user.clone());
                settings.password = Some(config.db_password.clone());
                settings.dbname = Some(config.db_name.clone());
            }
        }

        // DISCARD ALL on return so session-level SETs never reach the next caller
        settings.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Clean,
        });

        let acquire_timeout = config.pool_acquire_timeout_duration();
        let mut pool_config = PoolConfig::new(config.pool_max_size.max(1));
        pool_config.timeouts = Timeouts {
            wait: Some(acquire_timeout),
            create: Some(acquire_timeout),
            recycle: Some(acquire_timeout),
        };
        settings.pool = Some(pool_config);

        let pool = settings
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ColdQueryError::Connectivity(format!("failed to create pool: {}", e)))?;

        Ok(ConnectionPool {
            pool,
            min_size: config.pool_min_size.min(config.pool_max_size),
        })
    }

    /// Build the pool and open the configured minimum number of connections
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = Self::new(config)?;
        let opened = pool.warm_up().await?;
        info!(
            "Connection pool ready ({} warm connections, max {})",
            opened,
            pool.stats().max_size
        );
        Ok(pool)
    }

    /// Open `min_size` connections at once and hand them back idle
    pub async fn warm_up(&self) -> Result<usize> {
        let connections = try_join_all((0..self.min_size).map(|_| self.acquire())).await?;
        let opened = connections.len();
        drop(connections);
        debug!("Pre-warmed {} connections", opened);
        Ok(opened)
    }

    /// Check out one connection; dropping the returned object gives it back
    pub async fn acquire(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }

    pub fn stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Stop handing out connections and drop the idle ones
    pub fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
            info!("Connection pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
