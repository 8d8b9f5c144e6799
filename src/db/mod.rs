//! Database layer
//!
//! Owns the Postgres connection pool and the optional schema bootstrap.
//! Per-resource stores in `crate::store` borrow the pool from here.

pub mod changes;
pub mod pagination;
pub mod schema;

pub use changes::Changes;
pub use pagination::{Page, Pagination};

use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Connection pool handle shared across handlers
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect eagerly and optionally create the schema
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        tracing::info!("🗄️ Connecting to Postgres (max {} connections)", config.max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

        if config.init_schema {
            tracing::info!("📋 Bootstrapping database schema");
            schema::init_schema(&pool).await?;
        }

        tracing::info!("✅ Database pool ready");
        Ok(Self { pool })
    }

    /// Build a pool that opens connections on first use
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy(&config.url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
