//! SQLite-backed logical deletion.
//!
//! [`Paranoia`] is the entry point: build it from a
//! [`Schema`](paranoid_core::schema::Schema) and a
//! [`HookRegistry`](paranoid_core::hooks::HookRegistry), then pass a
//! connection to each operation. Every top-level call runs in its own
//! transaction, or in a savepoint when the connection is already inside one.
//! After-commit hooks only fire for a real commit, so work spanning several
//! calls goes through [`Paranoia::transaction`].

mod cascade;
mod codec;
pub mod config;
pub mod counter_cache;
mod deletion;
pub mod error;
pub mod paranoia;
mod persistence;
pub mod recovery;
pub mod scope;

use sqlx::sqlite::SqlitePoolOptions;

pub use config::DbConfig;
pub use error::{ParanoidError, ParanoidResult};
pub use paranoia::Paranoia;
pub use recovery::RecoverOptions;
pub use scope::{Predicate, Scope, Visibility};

pub type DbPool = sqlx::SqlitePool;

/// Create a connection pool from `config`.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    tracing::info!(
        url = %config.database_url,
        max_connections = config.max_connections,
        "Connecting to database"
    );
    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// Run a trivial query to confirm the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
