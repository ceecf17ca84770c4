//! Database management and migrations
//!
//! SQLite connection pool and embedded schema for the interrupt store, the
//! persistent lock table and the plan/node read models.

use crate::error::{InterruptError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Database connection wrapper
#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) pool: Arc<DatabasePool>,
}

impl Database {
    /// Open (creating if needed) the database file at `database_path`
    pub async fn new<P: AsRef<Path>>(database_path: P, max_connections: u32) -> Result<Self> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        debug!(path = %path.display(), "Connecting to database");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Database connection established");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Private in-memory database
    ///
    /// Limited to a single connection so every query sees the same memory
    /// database. Callers must not hold a row stream open while writing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Run migrations on the database
    ///
    /// Migrations are embedded in the binary and located in ./migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform a health check by running a simple query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| InterruptError::Other(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    /// Open the database and bring its schema up to date
    pub async fn initialize<P: AsRef<Path>>(database_path: P, max_connections: u32) -> Result<Self> {
        let db = Self::new(database_path, max_connections).await?;
        db.run_migrations().await?;
        Ok(db)
    }
}
