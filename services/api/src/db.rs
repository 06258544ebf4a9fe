//! Data Access Layer
//!
//! SQLite persistence for debate session state. Each session is a single row
//! holding the JSON-encoded `DebateState`; every save is one upsert statement,
//! so reads and writes are atomic per session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use debate_core::{state::DebateState, store::SessionStore};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// A wrapper around the `SqlitePool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Retrieves the persisted state of a session.
    pub async fn get_state(&self, session_id: &str) -> Result<Option<DebateState>> {
        let state_json: Option<String> =
            sqlx::query_scalar("SELECT state_json FROM debate_states WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        state_json
            .map(|json| {
                serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt state for session '{session_id}'"))
            })
            .transpose()
    }

    /// Inserts or replaces the state of a session.
    pub async fn put_state(&self, session_id: &str, state: &DebateState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO debate_states
                (session_id, topic, user_side, next_speaker, state_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(session_id) DO UPDATE SET
                topic = excluded.topic,
                user_side = excluded.user_side,
                next_speaker = excluded.next_speaker,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(&state.topic)
        .bind(state.user_side.as_role().as_str())
        .bind(state.next_speaker.map(|role| role.as_str()))
        .bind(&state_json)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Db {
    async fn load_state(&self, session_id: &str) -> Result<Option<DebateState>> {
        self.get_state(session_id).await
    }

    async fn save_state(&self, session_id: &str, state: &DebateState) -> Result<()> {
        self.put_state(session_id, state).await
    }
}
