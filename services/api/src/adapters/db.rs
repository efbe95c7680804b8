//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `SessionStore` port from the `core` crate. Sessions live in an embedded
//! SQLite file accessed through `sqlx`; the wizard state is stored as JSON.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use kuberstack_core::domain::{Session, WizardState};
use kuberstack_core::ports::{PortError, PortResult, SessionStore, StateMutator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lost write races tolerated by a single `update` before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 16;
const MAX_CREATE_ATTEMPTS: usize = 4;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `SessionStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
    expire: ChronoDuration,
}

impl DbAdapter {
    /// Creates a new `DbAdapter` over an existing pool. Sessions live for
    /// `expire` after creation or their last update.
    pub fn new(pool: SqlitePool, expire: Duration) -> Self {
        let expire =
            ChronoDuration::from_std(expire).unwrap_or_else(|_| ChronoDuration::days(365 * 100));
        Self { pool, expire }
    }

    /// Opens (creating if needed) the database file behind `url` with durable
    /// write settings.
    pub async fn connect(url: &str, expire: Duration) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool, expire))
    }

    /// A private in-memory database. Limited to one connection because every
    /// SQLite memory connection is its own database.
    pub async fn in_memory(expire: Duration) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool, expire))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn fetch_live(&self, token: &str, now: DateTime<Utc>) -> PortResult<SessionRecord> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT token, created_at, expires_at, version, state FROM sessions \
             WHERE token = ? AND expires_at > ?",
        )
        .bind(token)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| PortError::NotFound("session not found or expired".to_string()))
    }
}

fn storage(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

fn from_millis(millis: i64) -> PortResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| PortError::Storage(format!("corrupt timestamp {}", millis)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    token: String,
    created_at: i64,
    expires_at: i64,
    version: i64,
    state: String,
}

impl SessionRecord {
    fn to_domain(self) -> PortResult<(Session, i64)> {
        let state: WizardState = serde_json::from_str(&self.state)
            .map_err(|e| PortError::Storage(format!("corrupt session state: {}", e)))?;
        let session = Session {
            token: self.token,
            created_at: from_millis(self.created_at)?,
            expires_at: from_millis(self.expires_at)?,
            state,
        };
        Ok((session, self.version))
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn create(&self) -> PortResult<Session> {
        let state = serde_json::to_string(&WizardState::default())
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let token = Uuid::new_v4().simple().to_string();
            let created_at = Utc::now().timestamp_millis();
            let expires_at = (from_millis(created_at)? + self.expire).timestamp_millis();

            let inserted = sqlx::query(
                "INSERT INTO sessions (token, created_at, expires_at, version, state) \
                 VALUES (?, ?, ?, 0, ?)",
            )
            .bind(&token)
            .bind(created_at)
            .bind(expires_at)
            .bind(&state)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => {
                    return Ok(Session {
                        token,
                        created_at: from_millis(created_at)?,
                        expires_at: from_millis(expires_at)?,
                        state: WizardState::default(),
                    })
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    warn!("Session token collision, generating another one");
                    continue;
                }
                Err(e) => return Err(storage(e)),
            }
        }

        Err(PortError::Storage(
            "could not allocate a unique session token".to_string(),
        ))
    }

    async fn get(&self, token: &str) -> PortResult<Session> {
        let (session, _) = self.fetch_live(token, Utc::now()).await?.to_domain()?;
        Ok(session)
    }

    async fn update(&self, token: &str, mutator: StateMutator<'_>) -> PortResult<Session> {
        for attempt in 0..MAX_UPDATE_ATTEMPTS {
            let now = Utc::now();
            let (mut session, version) = self.fetch_live(token, now).await?.to_domain()?;

            mutator(&mut session.state)?;

            let state = serde_json::to_string(&session.state)
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
            let expires_at = (now + self.expire).timestamp_millis();

            // The version check makes the read-modify-write atomic per token
            // without holding a lock across the mutator.
            let result = sqlx::query(
                "UPDATE sessions SET state = ?, expires_at = ?, version = version + 1 \
                 WHERE token = ? AND version = ? AND expires_at > ?",
            )
            .bind(&state)
            .bind(expires_at)
            .bind(token)
            .bind(version)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

            if result.rows_affected() == 1 {
                session.expires_at = from_millis(expires_at)?;
                return Ok(session);
            }

            debug!(attempt, "Lost a session update race, retrying");
            tokio::task::yield_now().await;
        }

        Err(PortError::Storage(
            "session is being updated concurrently, retry later".to_string(),
        ))
    }

    async fn delete(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn list_live(&self) -> PortResult<Vec<Session>> {
        let records = sqlx::query_as::<_, SessionRecord>(
            "SELECT token, created_at, expires_at, version, state FROM sessions \
             WHERE expires_at > ? ORDER BY created_at ASC",
        )
        .bind(Utc::now().timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        records
            .into_iter()
            .map(|r| r.to_domain().map(|(session, _)| session))
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
