use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Read-write pool for the quote database. Foreign keys are enforced on every connection.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Pool for the customer directory when it lives in its own database. Opened read-only; the
/// directory is owned by another system.
pub async fn connect_read_only(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

/// Runs a single-value query; used by readiness checks.
pub async fn probe(pool: &DbPool, query: &str) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>(query).fetch_one(pool).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::connect_read_only;

    #[tokio::test]
    async fn directory_pool_refuses_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("directory.db").display());

        let writable = sqlx::SqlitePool::connect(&url).await.expect("writable");
        sqlx::query("CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&writable)
            .await
            .expect("create");
        sqlx::query("INSERT INTO customer (id, name) VALUES (41, 'Harbor Supply')")
            .execute(&writable)
            .await
            .expect("insert");
        writable.close().await;

        let directory = connect_read_only(&url, 1, 5).await.expect("read-only");
        let name: String = sqlx::query_scalar("SELECT name FROM customer WHERE id = 41")
            .fetch_one(&directory)
            .await
            .expect("read");
        assert_eq!(name, "Harbor Supply");

        let write = sqlx::query("INSERT INTO customer (id, name) VALUES (42, 'Ridge')")
            .execute(&directory)
            .await;
        assert!(write.is_err());
    }
}
