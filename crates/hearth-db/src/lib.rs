//! # hearth-db
//!
//! Storage layer for the hearth notification pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - The PostgreSQL notification store with cursor paging
//! - Presence persistence
//! - Read-only lookups against the host application's users and follow graph
//! - In-memory implementations of every store for tests and single-node mode
//!
//! ## Example
//!
//! ```rust,ignore
//! use hearth_db::{Database, NotificationRepository, ListNotificationsRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/hearth").await?;
//!     let page = db.notifications.list(ListNotificationsRequest::first_page(42)).await?;
//!     println!("{} notifications", page.items.len());
//!     Ok(())
//! }
//! ```

pub mod memory;
pub mod notifications;
pub mod pool;
pub mod presence;
pub mod relations;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use hearth_core::*;

pub use memory::{
    MemoryNotificationRepository, MemoryPresenceRepository, MemoryRelationRepository,
    MemoryUserDirectory,
};
pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use presence::PgPresenceRepository;
pub use relations::{PgRelationRepository, PgUserDirectory};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Notification store.
    pub notifications: PgNotificationRepository,
    /// Online/offline state.
    pub presence: PgPresenceRepository,
    /// Follow graph lookups.
    pub relations: PgRelationRepository,
    /// Sender profile lookups.
    pub users: PgUserDirectory,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notifications: PgNotificationRepository::new(pool.clone()),
            presence: PgPresenceRepository::new(pool.clone()),
            relations: PgRelationRepository::new(pool.clone()),
            users: PgUserDirectory::new(pool.clone()),
            pool,
        }
    }

    /// Connect to the database and create a Database instance.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with explicit pool settings.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}
