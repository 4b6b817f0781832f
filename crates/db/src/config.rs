use paranoid_core::error::CoreError;

/// Connection settings loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// SQLite connection URL (default: `sqlite::memory:`).
    pub database_url: String,
    /// Pool size (default: `5`).
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            max_connections: 5,
        }
    }
}

impl DbConfig {
    /// Load configuration from the environment, reading `.env` first if present.
    ///
    /// | Env Var                    | Default           |
    /// |----------------------------|-------------------|
    /// | `DATABASE_URL`             | `sqlite::memory:` |
    /// | `DATABASE_MAX_CONNECTIONS` | `5`               |
    pub fn from_env() -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let database_url = std::env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                CoreError::InvalidConfig(format!(
                    "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{raw}'"
                ))
            })?,
            Err(_) => defaults.max_connections,
        };
        if max_connections == 0 {
            return Err(CoreError::InvalidConfig(
                "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}
