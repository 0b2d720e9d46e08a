//! [`SqliteStore`]: the SQLite implementation of [`DirectoryStore`].

use std::path::Path;

use chrono::Utc;

use heaven_core::{
  identity::{IdentityRecord, RemoteId, UsernamePolicy},
  store::DirectoryStore,
};

use crate::{Error, Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Heaven identity store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  policy: UsernamePolicy,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  ///
  /// `policy` must match the directory's, since the `UNIQUE` username
  /// constraint is enforced on the normalised key.
  pub async fn open(path: impl AsRef<Path>, policy: UsernamePolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, policy };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(policy: UsernamePolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, policy };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-row `UPDATE`/`DELETE` and return the number of rows hit.
  async fn execute(&self, sql: &'static str, params: Vec<String>) -> Result<usize> {
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params))?))
      .await?;
    Ok(changed)
  }
}

// ─── DirectoryStore impl ─────────────────────────────────────────────────────

impl DirectoryStore for SqliteStore {
  type Error = Error;

  async fn load_all(&self) -> Result<Vec<IdentityRecord>> {
    let rows: Vec<(String, String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT remote_id, remote_display_name, local_username
             FROM identities
            ORDER BY registered_at, remote_id",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(remote_id, display_name, username)| {
          IdentityRecord::new(remote_id, display_name, username)
        })
        .collect(),
    )
  }

  async fn insert(&self, record: &IdentityRecord) -> Result<()> {
    let remote_id    = record.remote_id.as_str().to_owned();
    let display_name = record.remote_display_name.clone();
    let username     = record.local_username.clone();
    let username_key = self.policy.key(&record.local_username);
    let now          = Utc::now().to_rfc3339();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO identities (
             remote_id, remote_display_name, local_username, username_key,
             registered_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![remote_id, display_name, username, username_key, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn rename(&self, remote_id: &RemoteId, new_local_username: &str) -> Result<()> {
    let changed = self
      .execute(
        "UPDATE identities
            SET local_username = ?2, username_key = ?3, updated_at = ?4
          WHERE remote_id = ?1",
        vec![
          remote_id.as_str().to_owned(),
          new_local_username.to_owned(),
          self.policy.key(new_local_username),
          Utc::now().to_rfc3339(),
        ],
      )
      .await?;
    if changed == 0 {
      return Err(Error::NotFound(remote_id.to_string()));
    }
    Ok(())
  }

  async fn update_display_name(&self, remote_id: &RemoteId, display_name: &str) -> Result<()> {
    let changed = self
      .execute(
        "UPDATE identities
            SET remote_display_name = ?2, updated_at = ?3
          WHERE remote_id = ?1",
        vec![remote_id.as_str().to_owned(), display_name.to_owned(), Utc::now().to_rfc3339()],
      )
      .await?;
    if changed == 0 {
      return Err(Error::NotFound(remote_id.to_string()));
    }
    Ok(())
  }

  async fn remove(&self, remote_id: &RemoteId) -> Result<()> {
    self
      .execute("DELETE FROM identities WHERE remote_id = ?1", vec![remote_id.as_str().to_owned()])
      .await?;
    Ok(())
  }
}
