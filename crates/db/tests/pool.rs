//! Pool construction and health check against an in-memory database.

use paranoid_db::{create_pool, health_check, DbConfig};

#[tokio::test]
async fn test_create_pool_and_health_check() {
    let config = DbConfig {
        max_connections: 1,
        ..DbConfig::default()
    };
    let pool = create_pool(&config).await.expect("pool");

    health_check(&pool).await.expect("health check");
    assert!(!pool.is_closed());
}
