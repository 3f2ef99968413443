// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL record source (SQLite or MySQL through the sqlx `Any` driver).
//!
//! One table per record type. Timestamps are stored as nullable epoch
//! milliseconds so both dialects order them the same way:
//!
//! ```sql
//! SELECT ... FROM news
//! ORDER BY (timestamp IS NULL), timestamp DESC, id DESC
//! LIMIT ? OFFSET ?
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver hands MySQL TEXT columns back as bytes, so text columns
//! are read as `String` first and fall back to `Vec<u8>`.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use tracing::{debug, info};

use super::traits::{RecordSource, SourceError};
use crate::record::{FeedRecord, NewsRecord, VideoRecord};
use crate::resilience::retry::{retry_when, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// MySQL max_allowed_packet is typically 16MB; keep IN lists bounded.
const ID_CHUNK_SIZE: usize = 500;

fn source_error(e: sqlx::Error) -> SourceError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SourceError::Unavailable(e.to_string()),
        sqlx::Error::Database(ref db) if db.is_unique_violation() => SourceError::Conflict(e.to_string()),
        other => SourceError::Query(other.to_string()),
    }
}

fn is_transient(e: &SourceError) -> bool {
    matches!(e, SourceError::Unavailable(_))
}

/// A bindable column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
}

fn bind_value<'q>(query: Query<'q, Any, AnyArguments<'q>>, value: SqlValue) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
    }
}

/// Table mapping for a record type.
pub trait SqlRecord: FeedRecord {
    const TABLE: &'static str;

    /// Every column except `id`, in insert/select order.
    const COLUMNS: &'static [&'static str];

    /// DDL statements, run in order at startup.
    fn schema(is_sqlite: bool) -> Vec<String>;

    /// Values for [`Self::COLUMNS`], in the same order.
    fn insert_values(&self) -> Vec<SqlValue>;

    fn from_row(row: &AnyRow) -> Result<Self, SourceError>;
}

fn text(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn int(row: &AnyRow, column: &str) -> Option<i64> {
    row.try_get::<Option<i64>, _>(column).ok().flatten()
}

fn float(row: &AnyRow, column: &str) -> Option<f64> {
    row.try_get::<Option<f64>, _>(column).ok().flatten()
}

fn required_id(row: &AnyRow) -> Result<i64, SourceError> {
    row.try_get::<i64, _>("id").map_err(|e| SourceError::Query(e.to_string()))
}

fn millis_to_datetime(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::<Utc>::from_timestamp_millis)
}

impl SqlRecord for NewsRecord {
    const TABLE: &'static str = "news";
    const COLUMNS: &'static [&'static str] = &[
        "title", "summary", "source", "imageurl", "timestamp", "score", "topic_id", "category_id",
    ];

    fn schema(is_sqlite: bool) -> Vec<String> {
        if is_sqlite {
            vec![
                r#"
                CREATE TABLE IF NOT EXISTS news (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    summary TEXT NOT NULL,
                    source TEXT NOT NULL UNIQUE,
                    imageurl TEXT,
                    timestamp INTEGER,
                    score REAL,
                    topic_id INTEGER,
                    category_id INTEGER
                )
                "#
                .to_string(),
                "CREATE INDEX IF NOT EXISTS idx_news_timestamp ON news (timestamp)".to_string(),
            ]
        } else {
            vec![r#"
                CREATE TABLE IF NOT EXISTS news (
                    id BIGINT PRIMARY KEY AUTO_INCREMENT,
                    title LONGTEXT NOT NULL,
                    summary LONGTEXT NOT NULL,
                    source VARCHAR(255) NOT NULL UNIQUE,
                    imageurl TEXT,
                    timestamp BIGINT,
                    score DOUBLE,
                    topic_id BIGINT,
                    category_id BIGINT,
                    INDEX idx_timestamp (timestamp)
                )
                "#
            .to_string()]
        }
    }

    fn insert_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(Some(self.title.clone())),
            SqlValue::Text(Some(self.summary.clone())),
            SqlValue::Text(Some(self.source.clone())),
            SqlValue::Text(self.imageurl.clone()),
            SqlValue::Int(self.timestamp.map(|t| t.timestamp_millis())),
            SqlValue::Float(self.score),
            SqlValue::Int(self.topic_id),
            SqlValue::Int(self.category_id),
        ]
    }

    fn from_row(row: &AnyRow) -> Result<Self, SourceError> {
        Ok(Self {
            id: required_id(row)?,
            title: text(row, "title").unwrap_or_default(),
            summary: text(row, "summary").unwrap_or_default(),
            source: text(row, "source").unwrap_or_default(),
            imageurl: text(row, "imageurl"),
            timestamp: millis_to_datetime(int(row, "timestamp")),
            score: float(row, "score"),
            topic_id: int(row, "topic_id"),
            category_id: int(row, "category_id"),
        })
    }
}

impl SqlRecord for VideoRecord {
    const TABLE: &'static str = "videos";
    const COLUMNS: &'static [&'static str] = &[
        "title", "videourl", "source", "publisher_id", "timestamp", "score", "thumbnailurl",
    ];

    fn schema(is_sqlite: bool) -> Vec<String> {
        if is_sqlite {
            vec![
                r#"
                CREATE TABLE IF NOT EXISTS videos (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT,
                    videourl TEXT,
                    source TEXT,
                    publisher_id INTEGER,
                    timestamp INTEGER,
                    score REAL,
                    thumbnailurl TEXT
                )
                "#
                .to_string(),
                "CREATE INDEX IF NOT EXISTS idx_videos_timestamp ON videos (timestamp)".to_string(),
            ]
        } else {
            vec![r#"
                CREATE TABLE IF NOT EXISTS videos (
                    id BIGINT PRIMARY KEY AUTO_INCREMENT,
                    title TEXT,
                    videourl TEXT,
                    source TEXT,
                    publisher_id BIGINT,
                    timestamp BIGINT,
                    score DOUBLE,
                    thumbnailurl TEXT,
                    INDEX idx_timestamp (timestamp)
                )
                "#
            .to_string()]
        }
    }

    fn insert_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.title.clone()),
            SqlValue::Text(self.videourl.clone()),
            SqlValue::Text(self.source.clone()),
            SqlValue::Int(self.publisher_id),
            SqlValue::Int(self.timestamp.map(|t| t.timestamp_millis())),
            SqlValue::Float(self.score),
            SqlValue::Text(self.thumbnailurl.clone()),
        ]
    }

    fn from_row(row: &AnyRow) -> Result<Self, SourceError> {
        Ok(Self {
            id: required_id(row)?,
            title: text(row, "title"),
            videourl: text(row, "videourl"),
            source: text(row, "source"),
            publisher_id: int(row, "publisher_id"),
            timestamp: millis_to_datetime(int(row, "timestamp")),
            score: float(row, "score"),
            thumbnailurl: text(row, "thumbnailurl"),
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub struct SqlSource<R> {
    pool: AnyPool,
    is_sqlite: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for SqlSource<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            is_sqlite: self.is_sqlite,
            _record: PhantomData,
        }
    }
}

/// Open a pool with startup-mode retry (fails fast if config is wrong).
pub async fn connect_pool(connection_string: &str) -> Result<AnyPool, SourceError> {
    install_drivers();

    retry_when("sql_connect", &RetryConfig::startup(), is_transient, || async {
        AnyPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .connect(connection_string)
            .await
            .map_err(source_error)
    })
    .await
}

impl<R: SqlRecord> SqlSource<R> {
    /// Connect and create the record table if missing.
    pub async fn new(connection_string: &str) -> Result<Self, SourceError> {
        let pool = connect_pool(connection_string).await?;
        Self::with_pool(pool, connection_string.starts_with("sqlite:")).await
    }

    /// Share an existing pool (one pool serves every collection).
    pub async fn with_pool(pool: AnyPool, is_sqlite: bool) -> Result<Self, SourceError> {
        let source = Self {
            pool,
            is_sqlite,
            _record: PhantomData,
        };
        source.init_schema().await?;
        Ok(source)
    }

    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn init_schema(&self) -> Result<(), SourceError> {
        for statement in R::schema(self.is_sqlite) {
            retry_when("sql_init_schema", &RetryConfig::startup(), is_transient, || async {
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .map_err(source_error)
            })
            .await?;
        }
        info!(table = R::TABLE, "Record table ready");
        Ok(())
    }

    fn select_columns() -> String {
        format!("id, {}", R::COLUMNS.join(", "))
    }

    fn rows_to_records(rows: &[AnyRow]) -> Result<Vec<R>, SourceError> {
        rows.iter().map(R::from_row).collect()
    }
}

#[async_trait]
impl<R: SqlRecord> RecordSource<R> for SqlSource<R> {
    async fn list_recent(&self, offset: u64, limit: u64) -> Result<Vec<R>, SourceError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY (timestamp IS NULL), timestamp DESC, id DESC LIMIT ? OFFSET ?",
            Self::select_columns(),
            R::TABLE
        );

        let rows = retry_when("sql_list_recent", &RetryConfig::query(), is_transient, || async {
            sqlx::query(&sql)
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .bind(i64::try_from(offset).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await
                .map_err(source_error)
        })
        .await?;

        Self::rows_to_records(&rows)
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<R>, SourceError> {
        let mut records = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let sql = format!(
                "SELECT {} FROM {} WHERE id IN ({})",
                Self::select_columns(),
                R::TABLE,
                placeholders(chunk.len())
            );

            let rows = retry_when("sql_fetch_by_ids", &RetryConfig::query(), is_transient, || async {
                let mut query = sqlx::query(&sql);
                for id in chunk {
                    query = query.bind(*id);
                }
                query.fetch_all(&self.pool).await.map_err(source_error)
            })
            .await?;

            records.extend(Self::rows_to_records(&rows)?);
        }

        Ok(records)
    }

    async fn count(&self) -> Result<u64, SourceError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}", R::TABLE);

        let row = retry_when("sql_count", &RetryConfig::query(), is_transient, || async {
            sqlx::query(&sql).fetch_one(&self.pool).await.map_err(source_error)
        })
        .await?;

        let count: i64 = row.try_get("cnt").map_err(|e| SourceError::Query(e.to_string()))?;
        Ok(count as u64)
    }

    /// Inserts run in one transaction and are not retried (not idempotent).
    async fn insert_many(&self, drafts: Vec<R::Draft>) -> Result<Vec<R>, SourceError> {
        if drafts.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(R::COLUMNS.len())
        );
        // The Any driver reports no insert id for SQLite
        if self.is_sqlite {
            sql.push_str(" RETURNING id");
        }

        let mut tx = self.pool.begin().await.map_err(source_error)?;
        let mut inserted = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let record = R::from_draft(0, draft, now);
            let mut query = sqlx::query(&sql);
            for value in record.insert_values() {
                query = bind_value(query, value);
            }
            let id = if self.is_sqlite {
                let row = query.fetch_one(&mut *tx).await.map_err(source_error)?;
                required_id(&row)?
            } else {
                query
                    .execute(&mut *tx)
                    .await
                    .map_err(source_error)?
                    .last_insert_id()
                    .ok_or_else(|| SourceError::Query("driver did not report the inserted id".into()))?
            };
            inserted.push(record.with_id(id));
        }

        tx.commit().await.map_err(source_error)?;
        debug!(table = R::TABLE, count = inserted.len(), "Inserted records");
        Ok(inserted)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<Vec<i64>, SourceError> {
        let mut found: HashSet<i64> = HashSet::new();

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let select = format!("SELECT id FROM {} WHERE id IN ({})", R::TABLE, placeholders(chunk.len()));
            let delete = format!("DELETE FROM {} WHERE id IN ({})", R::TABLE, placeholders(chunk.len()));

            let mut tx = self.pool.begin().await.map_err(source_error)?;

            let mut query = sqlx::query(&select);
            for id in chunk {
                query = query.bind(*id);
            }
            let rows = query.fetch_all(&mut *tx).await.map_err(source_error)?;
            for row in &rows {
                found.insert(required_id(row)?);
            }

            if !rows.is_empty() {
                let mut query = sqlx::query(&delete);
                for id in chunk {
                    query = query.bind(*id);
                }
                query.execute(&mut *tx).await.map_err(source_error)?;
            }

            tx.commit().await.map_err(source_error)?;
        }

        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| found.contains(id) && seen.insert(*id))
            .collect())
    }
}
