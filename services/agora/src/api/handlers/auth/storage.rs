//! Durable session storage.
//!
//! Sessions live in a single SQLite database shared by every worker of a
//! deployment. The table is keyed by the SHA-256 hash of the opaque session
//! id; raw ids never touch the database. Rotation is a single `UPDATE`, so
//! concurrent readers either see the old or the new record, never a missing
//! one.

use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, warn};
use uuid::Uuid;

use super::backoff;
use super::types::AuthType;
use super::utils::{generate_session_token, hash_session_token, now_unix_ms};

const CREATE_ATTEMPTS: usize = 3;
const SWEEP_RETRY_ATTEMPTS: u32 = 3;
const SWEEP_BACKOFF_BASE_MS: u64 = 1_000;
const SWEEP_BACKOFF_MAX_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// No session for the presented id. Means "not authenticated", never a
    /// hard failure.
    #[error("session not found")]
    NotFound,
    /// The storage medium itself failed. Callers must surface this as a
    /// server error instead of treating it as a missing session.
    #[error("session store unavailable")]
    Unavailable(#[from] sqlx::Error),
    #[error("corrupted session record: {0}")]
    Corrupted(String),
    #[error("failed to generate a unique session id")]
    IdGeneration,
}

/// One stored session. The refresh token is owned exclusively by this record
/// and never serialized into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionRecord {
    pub(crate) user_id: Option<Uuid>,
    pub(crate) auth_type: AuthType,
    pub(crate) refresh_token: String,
    pub(crate) created_at_ms: i64,
    pub(crate) last_rotated_at_ms: i64,
}

/// Create the sessions table if this is a fresh database file.
pub(crate) async fn init(pool: &SqlitePool) -> Result<(), StoreError> {
    let query = r"
        CREATE TABLE IF NOT EXISTS sessions (
            session_hash BLOB PRIMARY KEY,
            refresh_token TEXT NOT NULL,
            auth_type TEXT NOT NULL,
            user_id TEXT,
            created_at_ms INTEGER NOT NULL,
            last_rotated_at_ms INTEGER NOT NULL,
            expires_at_ms INTEGER NOT NULL
        )
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "CREATE",
        db.statement = query
    );
    sqlx::query(query).execute(pool).instrument(span).await?;

    let query = "CREATE INDEX IF NOT EXISTS sessions_expires_at_idx ON sessions (expires_at_ms)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "CREATE",
        db.statement = query
    );
    sqlx::query(query).execute(pool).instrument(span).await?;
    Ok(())
}

/// Insert a new session and return the raw session id for the cookie.
///
/// Ids carry 256 bits of entropy, so collisions are not expected; the insert
/// still regenerates on a primary-key conflict rather than trusting that.
pub(crate) async fn create_session(
    pool: &SqlitePool,
    refresh_token: &str,
    auth_type: AuthType,
    user_id: Option<Uuid>,
    ttl_seconds: i64,
) -> Result<String, StoreError> {
    let query = r"
        INSERT INTO sessions
            (session_hash, refresh_token, auth_type, user_id, created_at_ms, last_rotated_at_ms, expires_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..CREATE_ATTEMPTS {
        let token = generate_session_token().map_err(|_| StoreError::IdGeneration)?;
        let token_hash = hash_session_token(&token);
        let now = now_unix_ms();
        let result = sqlx::query(query)
            .bind(&token_hash)
            .bind(refresh_token)
            .bind(auth_type.realm())
            .bind(user_id.map(|id| id.to_string()))
            .bind(now)
            .bind(now)
            .bind(now.saturating_add(ttl_seconds.saturating_mul(1_000)))
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err.into()),
        }
    }

    Err(StoreError::IdGeneration)
}

/// Look up an unexpired session by id hash.
pub(crate) async fn lookup_session(
    pool: &SqlitePool,
    token_hash: &[u8],
) -> Result<SessionRecord, StoreError> {
    let query = r"
        SELECT user_id, auth_type, refresh_token, created_at_ms, last_rotated_at_ms
        FROM sessions
        WHERE session_hash = ?
          AND expires_at_ms > ?
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(now_unix_ms())
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.map_or(Err(StoreError::NotFound), |row| record_from_row(&row))
}

/// Atomically replace the session's refresh token.
///
/// `last_rotated_at_ms` strictly increases even when two rotations land in
/// the same millisecond, so "rotation happened" is always observable.
pub(crate) async fn rotate_session(
    pool: &SqlitePool,
    token_hash: &[u8],
    new_refresh_token: &str,
) -> Result<SessionRecord, StoreError> {
    let query = r"
        UPDATE sessions
        SET refresh_token = ?,
            last_rotated_at_ms = MAX(?, last_rotated_at_ms + 1)
        WHERE session_hash = ?
          AND expires_at_ms > ?
        RETURNING user_id, auth_type, refresh_token, created_at_ms, last_rotated_at_ms
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(new_refresh_token)
        .bind(now_unix_ms())
        .bind(token_hash)
        .bind(now_unix_ms())
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    row.map_or(Err(StoreError::NotFound), |row| record_from_row(&row))
}

/// Remove the session. Idempotent; deleting an unknown id is not an error.
pub(crate) async fn delete_session(
    pool: &SqlitePool,
    token_hash: &[u8],
) -> Result<(), StoreError> {
    let query = "DELETE FROM sessions WHERE session_hash = ?";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(())
}

/// Drop every session past its expiry. Returns the number of rows removed.
pub(crate) async fn purge_expired(pool: &SqlitePool) -> Result<u64, StoreError> {
    let query = "DELETE FROM sessions WHERE expires_at_ms <= ?";
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(now_unix_ms())
        .execute(pool)
        .instrument(span)
        .await?;
    Ok(result.rows_affected())
}

/// Background worker that periodically purges expired sessions.
///
/// Transient store failures are retried with exponential backoff; if the
/// store stays down through every retry the worker signals `tx` so the
/// server can shut down instead of silently accumulating dead sessions.
pub(crate) fn spawn_expiry_sweep(
    pool: SqlitePool,
    interval_seconds: u64,
    tx: mpsc::UnboundedSender<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(interval_seconds)).await;

            for attempt in 0..SWEEP_RETRY_ATTEMPTS {
                if attempt > 0 {
                    let backoff_time = backoff::delay_ms(
                        SWEEP_BACKOFF_BASE_MS,
                        attempt - 1,
                        Some(SWEEP_BACKOFF_MAX_MS),
                        backoff::DEFAULT_FACTOR,
                    );
                    warn!("Backing off for {} ms before retrying sweep", backoff_time);
                    tokio::time::sleep(tokio::time::Duration::from_millis(backoff_time)).await;
                }

                match purge_expired(&pool).await {
                    Ok(purged) => {
                        if purged > 0 {
                            debug!("Purged {} expired sessions", purged);
                        }
                        break;
                    }
                    Err(err) => {
                        error!("Failed to purge expired sessions: {err}");

                        if attempt + 1 == SWEEP_RETRY_ATTEMPTS {
                            error!(
                                "Failed to purge expired sessions after {} attempts",
                                SWEEP_RETRY_ATTEMPTS
                            );
                            let _ = tx.send(());
                            return;
                        }
                    }
                }
            }
        }
    });
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, StoreError> {
    let auth_type: String = row.get("auth_type");
    let auth_type = auth_type
        .parse::<AuthType>()
        .map_err(StoreError::Corrupted)?;
    let user_id: Option<String> = row.get("user_id");
    let user_id = user_id.and_then(|id| Uuid::parse_str(&id).ok());
    Ok(SessionRecord {
        user_id,
        auth_type,
        refresh_token: row.get("refresh_token"),
        created_at_ms: row.get("created_at_ms"),
        last_rotated_at_ms: row.get("last_rotated_at_ms"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation))
}
