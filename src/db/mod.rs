pub mod polls;
pub mod votes;

use std::str::FromStr;
use std::time::Duration;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::error::PollResult;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;
        info!("Poll store ready at {}", db_url);

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a transaction that holds the store's write lock from its first statement,
    /// so check-then-write sequences cannot interleave with another writer.
    pub async fn begin_write(&self) -> PollResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Opens a read transaction; every query in it sees the same committed snapshot.
    pub async fn begin_read(&self) -> PollResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                poll_id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0 CHECK (status IN (0, 1, 2)),
                anonymous BOOLEAN NOT NULL,
                multiple_choice BOOLEAN NOT NULL,
                display BOOLEAN NOT NULL DEFAULT FALSE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // At most one active and at most one displayed poll, enforced by the store itself.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS polls_single_active
            ON polls (status) WHERE status = 1;
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS polls_single_display
            ON polls (display) WHERE display = 1;
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_choices (
                poll_choice_id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL,
                choice TEXT NOT NULL,
                marker TEXT NOT NULL,
                UNIQUE (poll_id, choice),
                UNIQUE (poll_id, marker),
                UNIQUE (poll_choice_id, poll_id),
                FOREIGN KEY (poll_id) REFERENCES polls (poll_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_votes (
                poll_id INTEGER NOT NULL,
                poll_choice_id INTEGER NOT NULL,
                team_code TEXT NOT NULL,
                voted_by TEXT NOT NULL,
                voted_at TEXT NOT NULL,
                PRIMARY KEY (poll_id, team_code, poll_choice_id),
                FOREIGN KEY (poll_choice_id, poll_id)
                    REFERENCES poll_choices (poll_choice_id, poll_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // No voter identity or timestamp: rows here must stay untraceable.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_anonym_active_votes (
                poll_choice_id INTEGER NOT NULL,
                team_code TEXT NOT NULL,
                PRIMARY KEY (poll_choice_id, team_code),
                FOREIGN KEY (poll_choice_id) REFERENCES poll_choices (poll_choice_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_anonym_votes (
                poll_id INTEGER NOT NULL,
                poll_choice_id INTEGER NOT NULL,
                count INTEGER NOT NULL CHECK (count >= 0),
                PRIMARY KEY (poll_id, poll_choice_id),
                FOREIGN KEY (poll_choice_id, poll_id)
                    REFERENCES poll_choices (poll_choice_id, poll_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}
