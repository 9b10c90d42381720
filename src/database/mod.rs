use crate::config::DatabaseConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};

pub mod audit;
pub mod publish_jobs;
pub mod queue_jobs;
pub mod stats;
pub mod tokens;

/// Embedded schema migrations, applied in order at startup.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema.sql",
    r#"
    CREATE TABLE IF NOT EXISTS publish_jobs (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        account_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        source_file_id TEXT NOT NULL,
        source_file_name TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        scheduled_at TEXT NOT NULL,
        result_asset_id TEXT,
        result_url TEXT,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        processing_started_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_publish_jobs_status_scheduled
        ON publish_jobs (status, scheduled_at);

    CREATE TABLE IF NOT EXISTS queue_jobs (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        account_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        source_url TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        result_asset_id TEXT,
        result_url TEXT,
        file_size INTEGER,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        processing_started_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_queue_jobs_status_priority
        ON queue_jobs (status, priority DESC, created_at ASC);

    CREATE TABLE IF NOT EXISTS account_tokens (
        owner TEXT NOT NULL,
        account_id TEXT NOT NULL,
        access_token TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        is_valid INTEGER NOT NULL DEFAULT 1,
        last_network_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (owner, account_id)
    );

    CREATE TABLE IF NOT EXISTS processing_stats (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        processed_today INTEGER NOT NULL DEFAULT 0,
        failed_today INTEGER NOT NULL DEFAULT 0,
        last_batch_at TEXT,
        last_reset_date TEXT NOT NULL
    );

    INSERT OR IGNORE INTO processing_stats (id, processed_today, failed_today, last_reset_date)
        VALUES (1, 0, 0, date('now'));

    CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL,
        owner TEXT NOT NULL,
        result_ref TEXT,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_log_job ON audit_log (job_id);
    "#,
)];

/// Parse a datetime from either RFC3339 or the SQLite datetime format.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(anyhow::anyhow!("Failed to parse datetime: {}", s))
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Create database if it doesn't exist (for SQLite)
        if !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePool::connect(&config.url).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        // Create migrations table if it doesn't exist
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL,
                checksum BLOB NOT NULL,
                execution_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MIGRATIONS {
            // Extract version from filename (e.g., "001_initial_schema.sql" -> 1)
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _sqlx_migrations WHERE version = ? AND success = true",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await?;

            if existing > 0 {
                continue;
            }

            let start = std::time::Instant::now();
            let mut transaction = self.pool.begin().await?;

            match sqlx::query(content).execute(&mut *transaction).await {
                Ok(_) => {
                    let execution_time = start.elapsed().as_millis() as i64;
                    let checksum = Self::calculate_checksum(content);

                    sqlx::query(
                        r#"
                        INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time)
                        VALUES (?, ?, true, ?, ?)
                        "#,
                    )
                    .bind(version)
                    .bind(name)
                    .bind(&checksum)
                    .bind(execution_time)
                    .execute(&mut *transaction)
                    .await?;

                    transaction.commit().await?;
                    tracing::info!("Applied migration: {} ({}ms)", name, execution_time);
                }
                Err(e) => {
                    transaction.rollback().await?;
                    return Err(anyhow::anyhow!("Migration {} failed: {}", name, e));
                }
            }
        }

        Ok(())
    }

    fn calculate_checksum(content: &str) -> Vec<u8> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish().to_be_bytes().to_vec()
    }
}
