use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use shared::domain::{Bookmark, BookmarkDraft, BookmarkId, OwnerId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    clock: Arc<CommitClock>,
}

/// Hands out strictly increasing commit timestamps so `created_at` order
/// always matches insertion order, even within one clock tick.
#[derive(Debug, Default)]
struct CommitClock {
    last_micros: AtomicI64,
}

impl CommitClock {
    fn next(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return DateTime::<Utc>::from_timestamp_micros(candidate)
                        .unwrap_or_else(Utc::now)
                }
                Err(observed) => last = observed,
            }
        }
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            clock: Arc::new(CommitClock::default()),
        })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<OwnerId> {
        let username = username.trim();
        if username.is_empty() {
            return Err(anyhow!("username must not be empty"));
        }
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(OwnerId(rec.get::<i64, _>(0)))
    }

    pub async fn user_exists(&self, owner_id: OwnerId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(owner_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Newest first; rows committed within the same instant fall back to id order.
    pub async fn list_bookmarks(&self, owner_id: OwnerId) -> Result<Vec<Bookmark>> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, url, created_at
             FROM bookmarks
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list bookmarks for owner {}", owner_id.0))?;

        rows.into_iter().map(bookmark_from_row).collect()
    }

    pub async fn create_bookmark(
        &self,
        owner_id: OwnerId,
        draft: &BookmarkDraft,
    ) -> Result<Bookmark> {
        let created_at = self.clock.next();
        let rec = sqlx::query(
            "INSERT INTO bookmarks (user_id, title, url, created_at) VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(owner_id.0)
        .bind(&draft.title)
        .bind(&draft.url)
        .bind(created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert bookmark for owner {}", owner_id.0))?;

        Ok(Bookmark {
            id: BookmarkId(rec.get::<i64, _>(0)),
            owner_id,
            title: draft.title.clone(),
            url: draft.url.clone(),
            created_at,
        })
    }

    /// Returns whether a row was removed. Rows owned by someone else are left alone.
    pub async fn delete_bookmark(
        &self,
        owner_id: OwnerId,
        bookmark_id: BookmarkId,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = ? AND user_id = ?")
            .bind(bookmark_id.0)
            .bind(owner_id.0)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete bookmark {}", bookmark_id.0))?;
        Ok(result.rows_affected() > 0)
    }
}

fn bookmark_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Bookmark> {
    let raw_created_at: String = row.try_get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&raw_created_at)
        .with_context(|| format!("invalid created_at '{raw_created_at}'"))?
        .with_timezone(&Utc);
    Ok(Bookmark {
        id: BookmarkId(row.try_get::<i64, _>(0)?),
        owner_id: OwnerId(row.try_get::<i64, _>(1)?),
        title: row.try_get(2)?,
        url: row.try_get(3)?,
        created_at,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
