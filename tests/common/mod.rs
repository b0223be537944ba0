//! Database test utilities
//!
//! Provides helpers for setting up test databases with testcontainers.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

use grouptrak::config::DatabaseConfig;
use grouptrak::db;
use grouptrak::models::{Event, Group, GroupStatus, GroupSubStatus, IssueCategory};
use grouptrak::services::GroupService;

/// A test database container with connection pool
pub struct TestDb {
    /// The running PostgreSQL container
    #[allow(dead_code)]
    container: ContainerAsync<Postgres>,
    /// Connection pool to the test database
    pub pool: PgPool,
}

impl TestDb {
    /// Creates a new test database with a fresh PostgreSQL container
    pub async fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let container = Postgres::default()
            .start()
            .await
            .expect("Failed to start PostgreSQL container");

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        let config = DatabaseConfig {
            url: format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        };

        let pool = db::create_pool(&config)
            .await
            .expect("Failed to connect to test database");

        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
            .execute(&pool)
            .await
            .expect("Failed to enable pgcrypto extension");

        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        assert!(db::health_check(&pool).await, "database must be reachable");

        TestDb { container, pool }
    }
}

/// Creates a group with default shape for the given project
#[allow(dead_code)]
pub async fn create_group(pool: &PgPool, project_id: i32) -> Group {
    GroupService::create(
        pool,
        project_id,
        "ValueError: boom",
        Some("api.handler"),
        40,
        IssueCategory::Error,
        &json!({}),
        Utc::now(),
    )
    .await
    .expect("Failed to create group")
}

/// Creates a group and forces it into the given state, bypassing
/// transition validation
#[allow(dead_code)]
pub async fn create_group_in_state(
    pool: &PgPool,
    project_id: i32,
    status: GroupStatus,
    substatus: Option<GroupSubStatus>,
) -> Group {
    let group = create_group(pool, project_id).await;

    sqlx::query_as::<_, Group>(
        "UPDATE groups SET status = $2, substatus = $3 WHERE id = $1 RETURNING *",
    )
    .bind(group.id)
    .bind(status)
    .bind(substatus)
    .fetch_one(pool)
    .await
    .expect("Failed to force group state")
}

/// Builds a minimal exception event for grouping tests
#[allow(dead_code)]
pub fn exception_event(project_id: i32, exc_type: &str, exc_value: &str) -> Event {
    Event::new(
        Uuid::new_v4(),
        project_id,
        json!({
            "platform": "python",
            "level": "error",
            "timestamp": "2024-05-01T12:00:00Z",
            "exception": {
                "values": [{
                    "type": exc_type,
                    "value": exc_value,
                    "stacktrace": {
                        "frames": [
                            {
                                "function": "main",
                                "module": "app",
                                "filename": "app.py",
                                "in_app": true,
                            },
                            {
                                "function": "handle",
                                "module": "app.views",
                                "filename": "views.py",
                                "in_app": true,
                            },
                        ]
                    }
                }]
            }
        }),
    )
}

/// Like [`exception_event`] but with control over the in-app flag of the
/// frames, which decides whether the app variant produces a hash
#[allow(dead_code)]
pub fn exception_event_with_in_app(
    project_id: i32,
    exc_type: &str,
    exc_value: &str,
    in_app: bool,
) -> Event {
    Event::new(
        Uuid::new_v4(),
        project_id,
        json!({
            "platform": "python",
            "level": "error",
            "timestamp": "2024-05-01T12:00:00Z",
            "exception": {
                "values": [{
                    "type": exc_type,
                    "value": exc_value,
                    "stacktrace": {
                        "frames": [
                            {
                                "function": "main",
                                "module": "app",
                                "filename": "app.py",
                                "in_app": in_app,
                            },
                            {
                                "function": "handle",
                                "module": "app.views",
                                "filename": "views.py",
                                "in_app": in_app,
                            },
                        ]
                    }
                }]
            }
        }),
    )
}

/// Builds an event with an explicit fingerprint and no exception
#[allow(dead_code)]
pub fn fingerprint_event(project_id: i32, fingerprint: &[&str]) -> Event {
    Event::new(
        Uuid::new_v4(),
        project_id,
        json!({
            "platform": "python",
            "level": "error",
            "timestamp": "2024-05-01T12:00:00Z",
            "message": "something broke",
            "fingerprint": fingerprint,
        }),
    )
}
