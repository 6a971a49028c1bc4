use crate::SqliteConfigSerde;
use log::{debug, warn};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{future::Future, sync::Arc, time::Duration as StdDuration};
use thiserror::Error;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    UtcOffset,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum SqliteMode {
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    Memory,
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub mode: SqliteMode,
    pub shared_cache: bool,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub foreign_keys: bool,
    pub wal_autocheckpoint: Option<u32>,
    pub temp_store: String,
    pub mmap_size: Option<u64>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfigSerde::default().into()
    }
}

impl SqliteConfig {
    fn read_only(&self) -> Self {
        Self {
            mode: SqliteMode::ReadOnly,
            synchronous: String::from("OFF"),
            foreign_keys: false,
            cache_size: self.cache_size * 2,
            ..self.clone()
        }
    }

    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let busy_timeout = StdDuration::from_millis(self.busy_timeout_ms as u64);
        let options = SqliteConnectOptions::new();

        let options = match self.mode {
            SqliteMode::Memory => {
                // Read and write pools must land on the same named in-memory database
                let memory_uri = format!("file:{}?mode=memory&cache=shared", database_path);
                return options
                    .filename(memory_uri)
                    .shared_cache(true)
                    .busy_timeout(busy_timeout)
                    .foreign_keys(self.foreign_keys);
            }
            SqliteMode::ReadOnly => {
                return options
                    .filename(database_path)
                    .read_only(true)
                    .shared_cache(self.shared_cache)
                    .busy_timeout(busy_timeout);
            }
            SqliteMode::ReadWrite => options.filename(database_path).read_only(false),
            SqliteMode::ReadWriteCreate => options
                .filename(database_path)
                .read_only(false)
                .create_if_missing(true),
        };

        let mut options = options
            .shared_cache(self.shared_cache)
            .busy_timeout(busy_timeout)
            .foreign_keys(self.foreign_keys)
            .pragma("journal_mode", self.journal_mode.clone())
            .pragma("synchronous", self.synchronous.clone())
            .pragma("cache_size", self.cache_size.to_string())
            .pragma("temp_store", self.temp_store.clone());

        if let Some(checkpoint) = self.wal_autocheckpoint {
            options = options.pragma("wal_autocheckpoint", checkpoint.to_string());
        }
        if let Some(mmap_size) = self.mmap_size {
            options = options.pragma("mmap_size", mmap_size.to_string());
        }

        options
    }
}

impl From<SqliteConfigSerde> for SqliteConfig {
    fn from(config: SqliteConfigSerde) -> Self {
        Self {
            mode: match config.mode.as_str() {
                "ReadWrite" => SqliteMode::ReadWrite,
                "ReadOnly" => SqliteMode::ReadOnly,
                "Memory" => SqliteMode::Memory,
                _ => SqliteMode::ReadWriteCreate,
            },
            shared_cache: config.cache != "Private",
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: config.journal_mode.to_uppercase(),
            synchronous: config.synchronous.to_uppercase(),
            cache_size: config.cache_size,
            foreign_keys: config.foreign_keys,
            wal_autocheckpoint: config.wal_autocheckpoint,
            temp_store: config.temp_store.to_lowercase(),
            mmap_size: config.mmap_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl From<crate::config::DBSettings> for DatabasePoolConfig {
    fn from(config: crate::config::DBSettings) -> Self {
        Self {
            read_max_connections: config.read_max_connections,
            read_min_connections: config.read_min_connections,
            write_max_connections: config.write_max_connections,
            write_min_connections: config.write_min_connections,
            idle_timeout_secs: config.idle_timeout_secs,
            acquire_timeout_secs: config.acquire_timeout_secs,
            sqlite_config: config.sqlite_config.into(),
        }
    }
}

static LEDGER_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/ledger");

#[derive(Error, Debug)]
pub enum DatabaseWriteError {
    #[error("timed out after {0:?} waiting for the write lock")]
    LockTimeout(StdDuration),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_name: String,
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    write_lock_timeout: StdDuration,
}

impl DBConnection {
    pub async fn new(
        path: &str,
        db_name: &str,
        database_pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let is_memory = database_pool_config.sqlite_config.mode == SqliteMode::Memory;
        let database_path = if is_memory {
            db_name.to_string()
        } else {
            format!("{}/{}.db", path, db_name)
        };

        if !is_memory {
            let database_url = format!("sqlite:{}", database_path);
            if !Sqlite::database_exists(&database_url).await? {
                Sqlite::create_database(&database_url).await?;
            }
        }

        let (read_pool, write_pool) =
            Self::create_pools(&database_path, &database_pool_config).await?;

        LEDGER_MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_name: db_name.to_string(),
            database_path,
            read_pool,
            write_pool,
            write_lock: Arc::new(Mutex::new(())),
            write_lock_timeout: StdDuration::from_secs(database_pool_config.acquire_timeout_secs),
        })
    }

    #[cfg(test)]
    pub fn new_with_pools(
        database_name: String,
        database_path: String,
        read_pool: SqlitePool,
        write_pool: SqlitePool,
    ) -> Self {
        Self {
            database_name,
            database_path,
            read_pool,
            write_pool,
            write_lock: Arc::new(Mutex::new(())),
            write_lock_timeout: StdDuration::from_secs(5),
        }
    }

    async fn create_pools(
        database_path: &str,
        database_pool_config: &DatabasePoolConfig,
    ) -> Result<(SqlitePool, SqlitePool), sqlx::Error> {
        let base = &database_pool_config.sqlite_config;
        let (read_config, write_config) = if base.mode == SqliteMode::Memory {
            (base.clone(), base.clone())
        } else {
            let write_config = SqliteConfig {
                mode: SqliteMode::ReadWrite,
                ..base.clone()
            };
            (base.read_only(), write_config)
        };

        let write_connection = write_config.build_connect_options(database_path);
        debug!("Write connection: {:?}", write_connection);

        let write_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.write_max_connections)
            .min_connections(database_pool_config.write_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(write_connection)
            .await?;

        let read_connection = read_config.build_connect_options(database_path);
        debug!("Read connection: {:?}", read_connection);

        let read_pool = SqlitePoolOptions::new()
            .max_connections(database_pool_config.read_max_connections)
            .min_connections(database_pool_config.read_min_connections)
            .acquire_timeout(StdDuration::from_secs(
                database_pool_config.acquire_timeout_secs,
            ))
            .idle_timeout(StdDuration::from_secs(
                database_pool_config.idle_timeout_secs,
            ))
            .connect_with(read_connection)
            .await?;

        Ok((read_pool, write_pool))
    }

    /// Runs `operation` against the write pool while holding the process-wide write lock.
    /// SQLite allows a single writer; serializing here keeps writers from failing with SQLITE_BUSY.
    pub async fn execute_write<F, Fut, T>(&self, operation: F) -> Result<T, DatabaseWriteError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let _guard = match tokio::time::timeout(self.write_lock_timeout, self.write_lock.lock())
            .await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "Write lock on {} not acquired within {:?}",
                    self.database_name, self.write_lock_timeout
                );
                return Err(DatabaseWriteError::LockTimeout(self.write_lock_timeout));
            }
        };

        operation(self.write_pool.clone())
            .await
            .map_err(DatabaseWriteError::Sqlx)
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub async fn close(self) {
        self.read_pool.close().await;
        self.write_pool.close().await;
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }
}

/// True when the error is a violation of a UNIQUE or PRIMARY KEY constraint
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Timestamps are stored as fixed width UTC RFC 3339 text so that string
/// comparison in SQL orders them chronologically.
pub fn format_timestamp(value: OffsetDateTime) -> Result<String, sqlx::Error> {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

/// Ids are stored as hyphenated text
pub fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let value: String = row.try_get(column)?;
    Uuid::parse_str(&value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Decodes a text column through `FromStr`, used for the status enums
pub fn parse_enum<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.try_get(column)?;
    value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = format_timestamp(datetime!(2025-03-01 09:00:00 UTC)).unwrap();
        let later = format_timestamp(datetime!(2025-03-01 09:00:00.5 UTC)).unwrap();
        assert_eq!(earlier, "2025-03-01T09:00:00.000000Z");
        assert!(earlier < later);

        let shifted = format_timestamp(datetime!(2025-03-01 12:00:00 +3)).unwrap();
        assert_eq!(shifted, earlier);
        assert_eq!(
            OffsetDateTime::parse(&later, &Rfc3339).unwrap(),
            datetime!(2025-03-01 09:00:00.5 UTC)
        );
    }

    #[sqlx::test(migrations = "./migrations/ledger")]
    async fn test_execute_write_serializes_writers(pool: SqlitePool) {
        let db = DBConnection::new_with_pools(
            "test".to_string(),
            ":memory:".to_string(),
            pool.clone(),
            pool,
        );
        let now = format_timestamp(OffsetDateTime::now_utc()).unwrap();

        let writes = (0..8).map(|i| {
            let db = db.clone();
            let now = now.clone();
            async move {
                db.execute_write(move |pool| async move {
                    sqlx::query(
                        "INSERT INTO users (id, name, email, role, created_at, updated_at)
                         VALUES (?, ?, ?, 'user', ?, ?)",
                    )
                    .bind(format!("user-{}", i))
                    .bind(format!("User {}", i))
                    .bind(format!("user{}@example.com", i))
                    .bind(&now)
                    .bind(&now)
                    .execute(&pool)
                    .await
                })
                .await
            }
        });
        for result in futures::future::join_all(writes).await {
            assert!(result.is_ok());
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(db.read())
            .await
            .unwrap();
        assert_eq!(count, 8);
    }
}
