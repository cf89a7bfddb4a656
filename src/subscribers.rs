use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Chats that receive the scheduled broadcast
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Returns false when the chat was already subscribed
    async fn add(&self, chat_id: i64) -> Result<bool>;
    /// Returns false when the chat was not subscribed
    async fn remove(&self, chat_id: i64) -> Result<bool>;
    async fn list(&self) -> Result<Vec<i64>>;
}

/// Thread-safe SQLite subscriber list
#[derive(Clone)]
pub struct SqliteSubscriberStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubscriberStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Subscriber store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS subscribers (
                chat_id INTEGER PRIMARY KEY,
                subscribed_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )
        .context("Failed to run subscriber migrations")?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for SqliteSubscriberStore {
    async fn add(&self, chat_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO subscribers (chat_id) VALUES (?1)",
                rusqlite::params![chat_id],
            )
            .context("Failed to insert subscriber")?;
        Ok(inserted > 0)
    }

    async fn remove(&self, chat_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM subscribers WHERE chat_id = ?1",
                rusqlite::params![chat_id],
            )
            .context("Failed to delete subscriber")?;
        Ok(deleted > 0)
    }

    async fn list(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT chat_id FROM subscribers ORDER BY subscribed_at ASC, chat_id ASC")
            .context("Failed to prepare subscriber query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query subscribers")?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("Failed to collect subscribers")?;
        Ok(ids)
    }
}
