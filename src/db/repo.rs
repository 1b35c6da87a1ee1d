use super::model::{AcceptedProblem, Room, RoomSummary, SubmissionRecord, TrackedUser};
use crate::model::ACCEPTED;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// For a file-backed SQLite URL, expand a leading `~/` and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = crate::config::expand_home(path_part);
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{expanded_path}?{q}"),
        None => format!("sqlite://{expanded_path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// Rooms

#[instrument(skip_all)]
pub async fn list_rooms(pool: &Pool) -> Result<Vec<RoomSummary>> {
    let rooms = sqlx::query_as::<_, RoomSummary>(
        "SELECT room_id, activated FROM rooms ORDER BY room_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rooms)
}

#[instrument(skip_all)]
pub async fn activated_rooms(pool: &Pool) -> Result<Vec<Room>> {
    let rooms = sqlx::query_as::<_, Room>(
        "SELECT room_id, webhook_url, activated, token, created_at FROM rooms WHERE activated = 1 ORDER BY room_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rooms)
}

#[instrument(skip(pool))]
pub async fn room_webhook(pool: &Pool, room_id: &str) -> Result<Option<String>> {
    let url = sqlx::query_scalar::<_, String>("SELECT webhook_url FROM rooms WHERE room_id = ?")
        .bind(room_id)
        .fetch_optional(pool)
        .await?;
    Ok(url)
}

/// Drop a registration that was never activated so its id can be claimed again.
#[instrument(skip(pool))]
pub async fn remove_inactive_room(pool: &Pool, room_id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM rooms WHERE room_id = ? AND activated = 0")
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Insert a new room. Returns false when the id is already taken.
#[instrument(skip(pool, webhook_url, token))]
pub async fn insert_room(
    pool: &Pool,
    room_id: &str,
    webhook_url: &str,
    token: &str,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO rooms (room_id, webhook_url, activated, token, created_at) VALUES (?, ?, 0, ?, ?) \
         ON CONFLICT (room_id) DO NOTHING",
    )
    .bind(room_id)
    .bind(webhook_url)
    .bind(token)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Replace the room's token. Returns false for an unknown room.
#[instrument(skip(pool, token))]
pub async fn rotate_token(pool: &Pool, room_id: &str, token: &str) -> Result<bool> {
    let res = sqlx::query("UPDATE rooms SET token = ? WHERE room_id = ?")
        .bind(token)
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip(pool, token))]
pub async fn authenticate(pool: &Pool, room_id: &str, token: &str) -> Result<Option<Room>> {
    let room = sqlx::query_as::<_, Room>(
        "SELECT room_id, webhook_url, activated, token, created_at FROM rooms WHERE room_id = ? AND token = ?",
    )
    .bind(room_id)
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(room)
}

/// Flip the activation flag. Only the call that actually flips it sees `true`.
#[instrument(skip(pool))]
pub async fn activate_room(pool: &Pool, room_id: &str) -> Result<bool> {
    let res = sqlx::query("UPDATE rooms SET activated = 1 WHERE room_id = ? AND activated = 0")
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip(pool))]
pub async fn delete_room(pool: &Pool, room_id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM rooms WHERE room_id = ?")
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

// Tracked users

#[instrument(skip(pool))]
pub async fn list_users(pool: &Pool, room_id: &str) -> Result<Vec<TrackedUser>> {
    let users = sqlx::query_as::<_, TrackedUser>(
        "SELECT user_id, atcoder_id FROM users WHERE room_id = ? ORDER BY user_id",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Track a user in a room; re-adding a handle replaces its AtCoder id.
#[instrument(skip(pool))]
pub async fn add_user(pool: &Pool, room_id: &str, user_id: &str, atcoder_id: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (room_id, user_id, atcoder_id) VALUES (?, ?, ?) \
         ON CONFLICT (room_id, user_id) DO UPDATE SET atcoder_id = excluded.atcoder_id",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(atcoder_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_user(pool: &Pool, room_id: &str, user_id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM users WHERE room_id = ? AND user_id = ?")
        .bind(room_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

// Submissions

/// Upsert problems and submissions for one user in a single transaction.
/// Known submissions are left untouched, so `created_at` keeps the time the
/// submission was first seen. Returns how many submissions were new.
#[instrument(skip(pool, records), fields(count = records.len()))]
pub async fn record_submissions(
    pool: &Pool,
    atcoder_id: &str,
    records: &[SubmissionRecord],
    seen_at: DateTime<Utc>,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for rec in records {
        sqlx::query(
            "INSERT INTO problems (problem_url, problem_name) VALUES (?, ?) \
             ON CONFLICT (problem_url) DO NOTHING",
        )
        .bind(&rec.problem_url)
        .bind(&rec.problem_name)
        .execute(&mut *tx)
        .await?;

        let res = sqlx::query(
            "INSERT INTO submissions (submission_url, problem_url, user_id, result, score, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (submission_url) DO NOTHING",
        )
        .bind(&rec.submission_url)
        .bind(&rec.problem_url)
        .bind(atcoder_id)
        .bind(&rec.result)
        .bind(rec.score)
        .bind(seen_at)
        .execute(&mut *tx)
        .await?;
        inserted += res.rows_affected();
    }
    tx.commit().await.context("failed to commit submissions")?;
    Ok(inserted)
}

/// Problems the user got accepted after `since` without an accepted
/// submission at or before `since`. One row per problem, best score.
#[instrument(skip(pool))]
pub async fn newly_accepted(
    pool: &Pool,
    atcoder_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<AcceptedProblem>> {
    let rows = sqlx::query_as::<_, AcceptedProblem>(
        "SELECT p.problem_url AS problem_url, p.problem_name AS problem_name, MAX(s.score) AS score \
         FROM submissions s JOIN problems p ON p.problem_url = s.problem_url \
         WHERE s.user_id = ? AND s.result = ? AND s.created_at > ? \
           AND NOT EXISTS ( \
             SELECT 1 FROM submissions o \
             WHERE o.user_id = s.user_id AND o.problem_url = s.problem_url \
               AND o.result = ? AND o.created_at <= ?) \
         GROUP BY p.problem_url, p.problem_name \
         ORDER BY p.problem_url",
    )
    .bind(atcoder_id)
    .bind(ACCEPTED)
    .bind(since)
    .bind(ACCEPTED)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// Report cursor

#[instrument(skip(pool))]
pub async fn last_reported(pool: &Pool, room_id: &str) -> Result<Option<DateTime<Utc>>> {
    let at = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT last_reported FROM last_reported WHERE room_id = ?",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?;
    Ok(at)
}

/// Read the cursor, creating it at `now` on a room's first report.
#[instrument(skip(pool))]
pub async fn init_last_reported(
    pool: &Pool,
    room_id: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if let Some(at) = last_reported(pool, room_id).await? {
        return Ok(at);
    }
    sqlx::query(
        "INSERT INTO last_reported (room_id, last_reported) VALUES (?, ?) \
         ON CONFLICT (room_id) DO NOTHING",
    )
    .bind(room_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(now)
}

#[instrument(skip(pool))]
pub async fn set_last_reported(pool: &Pool, room_id: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "INSERT INTO last_reported (room_id, last_reported) VALUES (?, ?) \
         ON CONFLICT (room_id) DO UPDATE SET last_reported = excluded.last_reported",
    )
    .bind(room_id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}
