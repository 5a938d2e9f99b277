use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFlag {
    pub name: String,
    pub set_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections_for(database_url))
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run flag store migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn load_flag(&self, name: &str) -> Result<Option<StoredFlag>> {
        let row = sqlx::query("SELECT name, set_at FROM flags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load flag '{name}'"))?;

        row.map(|row| -> Result<StoredFlag> {
            Ok(StoredFlag {
                name: row.try_get("name")?,
                set_at: row.try_get("set_at")?,
            })
        })
        .transpose()
    }

    /// Sets the flag. Setting an already-set flag keeps the first timestamp
    /// and returns `false`.
    pub async fn set_flag(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO flags (name, set_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set flag '{name}'"))?;
        let inserted = result.rows_affected() > 0;
        debug!(flag = name, inserted, "stored flag");
        Ok(inserted)
    }

    pub async fn clear_flag(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flags WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear flag '{name}'"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn max_connections_for(database_url: &str) -> u32 {
    if database_url.contains(":memory:") {
        1
    } else {
        5
    }
}

/// Turns a plain file path or a single-colon `sqlite:` URL into a
/// `sqlite://` URL. Blank input yields `None`.
pub fn normalize_database_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("sqlite::memory:") || raw.contains("://") {
        return Some(raw.to_string());
    }
    let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
    Some(format!("sqlite://{}", path.replace('\\', "/")))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create '{}' for sqlite database '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
