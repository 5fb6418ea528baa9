//! SQLite journal for conversation history.
//!
//! Enabled by `[memory].journal_path`. Each message appended to the
//! [`MemoryStore`] is written as one row; at startup [`rehydrate`] replays
//! the rows back into a fresh store, thread by thread in append order.
//!
//! Messages are stored as JSON so the schema does not change when the
//! message model grows fields.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rag_agent_core::memory::{MemoryJournal, MemoryStore};
use rag_agent_core::models::Message;
use rag_agent_core::tools::BoxError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub struct SqliteJournal {
    pool: SqlitePool,
}

impl SqliteJournal {
    /// Open (creating if missing) the journal database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create journal directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open journal: {}", path.display()))?;

        let journal = Self { pool };
        journal.migrate().await?;
        Ok(journal)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                role TEXT NOT NULL,
                message_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All journaled threads with their messages in append order.
    pub async fn load_all(&self) -> Result<Vec<(String, Vec<Message>)>> {
        let rows = sqlx::query("SELECT thread_id, message_json FROM messages ORDER BY thread_id, id")
            .fetch_all(&self.pool)
            .await?;

        let mut threads: Vec<(String, Vec<Message>)> = Vec::new();
        for row in rows {
            let thread_id: String = row.get("thread_id");
            let json: String = row.get("message_json");
            let message: Message = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt journal entry in thread {}", thread_id))?;
            match threads.last_mut() {
                Some((id, messages)) if *id == thread_id => messages.push(message),
                _ => threads.push((thread_id, vec![message])),
            }
        }
        Ok(threads)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MemoryJournal for SqliteJournal {
    async fn record(&self, thread_id: &str, message: &Message) -> Result<(), BoxError> {
        sqlx::query(
            "INSERT INTO messages (thread_id, role, message_json, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(thread_id)
        .bind(message.role.as_str())
        .bind(serde_json::to_string(message)?)
        .bind(message.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn forget(&self, thread_id: &str) -> Result<(), BoxError> {
        sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Load every journaled thread into `store`.
pub async fn rehydrate(journal: &SqliteJournal, store: &MemoryStore) -> Result<usize> {
    let threads = journal.load_all().await?;
    let count = threads.len();
    for (thread_id, messages) in threads {
        store.restore(&thread_id, messages).await;
    }
    info!(threads = count, "restored conversation history");
    Ok(count)
}
