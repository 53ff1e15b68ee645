use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;

/// Database connection pool manager
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the registry database at the configured path
    pub async fn open(config: &Config) -> Result<Self> {
        info!("Opening registry database at {}", config.db_path);

        // foreign_keys must be on for the include cascade to fire
        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5) // Default pool size
            .acquire_timeout(Duration::from_millis(2000))
            .connect_with(options)
            .await
            .context("Failed to open registry database")?;

        info!("Registry database opened");

        Ok(Self { pool })
    }

    /// Open an in-memory database. The pool is pinned to a single
    /// connection because an in-memory SQLite database lives and dies
    /// with its connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }

    /// Gracefully close the database connection pool
    pub async fn close(self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

/// Open the database and optionally run migrations
pub async fn init_database(config: &Config, auto_migrate: bool) -> Result<Database> {
    let db = Database::open(config).await?;

    if auto_migrate {
        db.migrate().await?;
    } else {
        warn!("Auto-migration is disabled. Run migrations manually with: sqlx migrate run");
    }

    // Verify connection
    db.health_check()
        .await
        .context("Database health check failed after initialization")?;

    Ok(db)
}
