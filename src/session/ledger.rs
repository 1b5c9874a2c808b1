//! Persisted listening statistics.
//!
//! Commits from the session tracker are handed to a [`ListenLedger`]. The
//! SQLite implementation only enqueues on the caller's side; a background
//! task performs the inserts so accounting never blocks playback.

use std::{fs::create_dir_all, path::Path};

use {
    async_channel::{Receiver, Sender, unbounded},
    parking_lot::Mutex,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
    },
    thiserror::Error,
    tokio::{spawn, task::JoinHandle},
    tracing::{debug, warn},
};

/// Current ledger schema version.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Error type for ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The stored schema cannot be used.
    #[error("Schema error: {reason}")]
    Schema { reason: String },
    /// The ledger no longer accepts records.
    #[error("Ledger is closed")]
    Closed,
}

/// One listening span worth recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRecord {
    pub track_id: i64,
    pub album_id: i64,
    pub artist: String,
    /// Whole seconds listened (floored).
    pub seconds: u64,
}

/// Destination for listen records.
pub trait ListenLedger: Send + Sync {
    /// Records a listen.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the record cannot be accepted.
    fn record_listen(&self, record: ListenRecord) -> Result<(), LedgerError>;
}

/// SQLite-backed ledger with a background writer.
pub struct SqliteLedger {
    pool: SqlitePool,
    writer_tx: Sender<ListenRecord>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteLedger {
    /// Opens (creating if needed) the ledger database at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Database file
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the database cannot be opened or its schema
    /// is from an unknown version.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent()
            && let Err(e) = create_dir_all(parent)
        {
            return Err(LedgerError::Schema {
                reason: format!("cannot create {}: {e}", parent.display()),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePool::connect_with(options).await?;
        initialize_schema(&pool).await?;

        let (writer_tx, writer_rx) = unbounded();
        let writer = spawn(run_writer(pool.clone(), writer_rx));
        debug!(path = %path.display(), "Listen ledger opened");

        Ok(Self {
            pool,
            writer_tx,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Total seconds recorded for a track.
    #[cfg(test)]
    pub async fn total_seconds(&self, track_id: i64) -> Result<u64, LedgerError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(seconds), 0) FROM listens WHERE track_id = ?")
                .bind(track_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Number of recorded listens.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Database` if the query fails.
    pub async fn listen_count(&self) -> Result<u64, LedgerError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listens")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Stops accepting records and waits for queued ones to be written.
    pub async fn close(&self) {
        self.writer_tx.close();
        let writer = self.writer.lock().take();
        if let Some(writer) = writer
            && let Err(e) = writer.await
        {
            warn!(error = %e, "Ledger writer task failed");
        }
    }
}

impl ListenLedger for SqliteLedger {
    fn record_listen(&self, record: ListenRecord) -> Result<(), LedgerError> {
        self.writer_tx
            .try_send(record)
            .map_err(|_| LedgerError::Closed)
    }
}

async fn run_writer(pool: SqlitePool, records: Receiver<ListenRecord>) {
    while let Ok(record) = records.recv().await {
        if let Err(e) = insert_record(&pool, &record).await {
            warn!(track_id = record.track_id, error = %e, "Failed to record listen");
        }
    }
    debug!("Ledger writer finished");
}

async fn insert_record(pool: &SqlitePool, record: &ListenRecord) -> Result<(), LedgerError> {
    sqlx::query("INSERT INTO listens (track_id, album_id, artist, seconds) VALUES (?, ?, ?, ?)")
        .bind(record.track_id)
        .bind(record.album_id)
        .bind(&record.artist)
        .bind(i64::try_from(record.seconds).unwrap_or(i64::MAX))
        .execute(pool)
        .await?;
    Ok(())
}

async fn initialize_schema(pool: &SqlitePool) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await?;

    match current_version {
        None => {
            sqlx::query(
                r#"
                CREATE TABLE listens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    track_id INTEGER NOT NULL,
                    album_id INTEGER NOT NULL,
                    artist TEXT NOT NULL,
                    seconds INTEGER NOT NULL,
                    recorded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )
                "#,
            )
            .execute(pool)
            .await?;
            sqlx::query("CREATE INDEX idx_listens_track_id ON listens (track_id)")
                .execute(pool)
                .await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(CURRENT_SCHEMA_VERSION)
                .execute(pool)
                .await?;
        }
        Some(version) if version == CURRENT_SCHEMA_VERSION => {}
        Some(version) => {
            return Err(LedgerError::Schema {
                reason: format!("unknown ledger schema version {version}"),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::session::ledger::{LedgerError, ListenLedger, ListenRecord, SqliteLedger};

    fn record(track_id: i64, seconds: u64) -> ListenRecord {
        ListenRecord {
            track_id,
            album_id: 10,
            artist: "Artist".to_string(),
            seconds,
        }
    }

    #[tokio::test]
    async fn test_records_are_written_by_background_writer() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::open(&dir.path().join("listens.db"))
            .await
            .unwrap();

        ledger.record_listen(record(1, 42)).unwrap();
        ledger.record_listen(record(1, 8)).unwrap();
        ledger.record_listen(record(2, 5)).unwrap();
        ledger.close().await;

        assert_eq!(ledger.total_seconds(1).await.unwrap(), 50);
        assert_eq!(ledger.total_seconds(3).await.unwrap(), 0);
        assert_eq!(ledger.listen_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_closed_ledger_rejects_records() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::open(&dir.path().join("listens.db"))
            .await
            .unwrap();
        ledger.close().await;

        assert!(matches!(
            ledger.record_listen(record(1, 10)),
            Err(LedgerError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("listens.db");

        let ledger = SqliteLedger::open(&path).await.unwrap();
        ledger.record_listen(record(7, 120)).unwrap();
        ledger.close().await;
        drop(ledger);

        let reopened = SqliteLedger::open(&path).await.unwrap();
        assert_eq!(reopened.total_seconds(7).await.unwrap(), 120);
    }
}
