//! [`Registrar`]: applies register / rename / unregister requests coming
//! from the messaging platform's UI.
//!
//! The [`Directory`] decides every uniqueness question. Accepted writes are
//! then mirrored to the [`DirectoryStore`]; if persisting fails the directory
//! change is rolled back so memory and disk never disagree.
//!
//! Writes are applied one at a time: a change, its persistence and any
//! rollback complete before the next write looks at the directory.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
  Error,
  directory::Directory,
  identity::{IdentityRecord, RemoteId},
  store::DirectoryStore,
};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum RegistrationError {
  #[error("already registered as {existing:?}")]
  AlreadyRegistered { existing: String },

  #[error("username {0:?} is taken")]
  UsernameTaken(String),

  #[error("not registered")]
  NotRegistered,

  #[error("invalid username: {0}")]
  InvalidUsername(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RegistrationError {
  /// Text shown to the user who made the request.
  pub fn user_message(&self) -> String {
    match self {
      Self::AlreadyRegistered { existing } => format!(
        "You are already registered under the name {existing}! If that's not your nickname, \
         please report to the server administrator."
      ),
      Self::UsernameTaken(name) => format!("Someone's already registered under the name {name}."),
      Self::NotRegistered => "You are not registered at all!".to_string(),
      Self::InvalidUsername(reason) => format!("That nickname can't be used: {reason}."),
      Self::Store(_) => "Something went wrong while saving, please try again later.".to_string(),
    }
  }
}

/// Trim and check a requested game-server username.
///
/// Names are 3–16 characters of ASCII letters, digits and underscores.
pub fn validate_username(raw: &str) -> Result<String, RegistrationError> {
  let name = raw.trim();
  let len = name.chars().count();
  if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
    return Err(RegistrationError::InvalidUsername(format!(
      "must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
    )));
  }
  if let Some(c) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
    return Err(RegistrationError::InvalidUsername(format!("character {c:?} is not allowed")));
  }
  Ok(name.to_owned())
}

pub struct Registrar<S> {
  directory: Arc<Directory>,
  store:     Arc<S>,
  /// Shared by clones; held for the whole of each write.
  writes:    Arc<Mutex<()>>,
}

impl<S> Clone for Registrar<S> {
  fn clone(&self) -> Self {
    Self {
      directory: self.directory.clone(),
      store:     self.store.clone(),
      writes:    self.writes.clone(),
    }
  }
}

impl<S: DirectoryStore> Registrar<S> {
  pub fn new(directory: Arc<Directory>, store: Arc<S>) -> Self {
    Self { directory, store, writes: Arc::new(Mutex::new(())) }
  }

  pub fn directory(&self) -> &Arc<Directory> { &self.directory }

  /// Link `remote_id` to `local_username`.
  pub async fn register(
    &self,
    remote_id: RemoteId,
    display_name: &str,
    local_username: &str,
  ) -> Result<IdentityRecord, RegistrationError> {
    let name = validate_username(local_username)?;
    let _writes = self.writes.lock().await;
    if let Some(existing) = self.directory.find_by_remote_id(&remote_id) {
      return Err(RegistrationError::AlreadyRegistered { existing: existing.local_username });
    }

    let record = IdentityRecord::new(remote_id, display_name, name);
    self.directory.insert(record.clone()).map_err(|e| match e {
      Error::DuplicateRemoteId(id) => RegistrationError::AlreadyRegistered {
        existing: self
          .directory
          .find_by_remote_id(&id)
          .map(|r| r.local_username)
          .unwrap_or_default(),
      },
      Error::DuplicateLocalUsername(name) => RegistrationError::UsernameTaken(name),
      other => RegistrationError::Store(Box::new(other)),
    })?;

    if let Err(e) = self.store.insert(&record).await {
      error!(remote_id = %record.remote_id, error = %e, "failed to persist registration; rolling back");
      self.directory.remove_by_remote_id(&record.remote_id);
      return Err(RegistrationError::Store(Box::new(e)));
    }

    info!(
      remote_id = %record.remote_id,
      local_username = %record.local_username,
      display_name = %record.remote_display_name,
      "identity registered"
    );
    Ok(record)
  }

  /// Change the username linked to `remote_id`.
  pub async fn rename(
    &self,
    remote_id: &RemoteId,
    new_local_username: &str,
  ) -> Result<IdentityRecord, RegistrationError> {
    let name = validate_username(new_local_username)?;
    let _writes = self.writes.lock().await;
    let previous = self.directory.rename(remote_id, &name).map_err(|e| match e {
      Error::UnknownRemoteId(_) => RegistrationError::NotRegistered,
      Error::DuplicateLocalUsername(name) => RegistrationError::UsernameTaken(name),
      other => RegistrationError::Store(Box::new(other)),
    })?;

    if let Err(e) = self.store.rename(remote_id, &name).await {
      error!(%remote_id, error = %e, "failed to persist rename; rolling back");
      if let Err(rollback) = self.directory.rename(remote_id, &previous.local_username) {
        warn!(%remote_id, error = %rollback, "could not restore previous username");
      }
      return Err(RegistrationError::Store(Box::new(e)));
    }

    info!(%remote_id, from = %previous.local_username, to = %name, "identity renamed");
    Ok(IdentityRecord { local_username: name, ..previous })
  }

  /// Remove the link for `remote_id`.
  pub async fn unregister(&self, remote_id: &RemoteId) -> Result<IdentityRecord, RegistrationError> {
    let _writes = self.writes.lock().await;
    let record = self
      .directory
      .remove_by_remote_id(remote_id)
      .ok_or(RegistrationError::NotRegistered)?;

    if let Err(e) = self.store.remove(remote_id).await {
      error!(%remote_id, error = %e, "failed to persist unregistration; rolling back");
      if let Err(rollback) = self.directory.insert(record) {
        warn!(%remote_id, error = %rollback, "could not restore identity");
      }
      return Err(RegistrationError::Store(Box::new(e)));
    }

    info!(%remote_id, local_username = %record.local_username, "identity unregistered");
    Ok(record)
  }

  /// Keep the stored display name in sync with the platform. Best effort:
  /// failures are logged, never surfaced.
  pub async fn refresh_display_name(&self, remote_id: &RemoteId, display_name: &str) {
    let _writes = self.writes.lock().await;
    let Some(record) = self.directory.find_by_remote_id(remote_id) else { return };
    if record.remote_display_name == display_name {
      return;
    }
    if self.directory.update_display_name(remote_id, display_name).is_err() {
      return;
    }
    if let Err(e) = self.store.update_display_name(remote_id, display_name).await {
      warn!(%remote_id, error = %e, "failed to persist display name");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    sync::{
      Mutex,
      atomic::{AtomicBool, Ordering},
    },
    time::Duration,
  };

  use tokio::sync::{Notify, oneshot};

  use super::*;

  #[derive(Debug, Error)]
  #[error("disk full")]
  struct DiskFull;

  /// Map-backed store that can be told to fail every write, or to park the
  /// next `rename` until released.
  #[derive(Default)]
  struct MemoryStore {
    rows:    Mutex<HashMap<RemoteId, IdentityRecord>>,
    fail:    AtomicBool,
    pause:   Mutex<Option<oneshot::Receiver<()>>>,
    entered: Notify,
  }

  impl MemoryStore {
    fn check(&self) -> Result<(), DiskFull> {
      if self.fail.load(Ordering::SeqCst) { Err(DiskFull) } else { Ok(()) }
    }

    fn row(&self, id: &str) -> Option<IdentityRecord> {
      self.rows.lock().unwrap().get(&RemoteId::from(id)).cloned()
    }
  }

  impl DirectoryStore for MemoryStore {
    type Error = DiskFull;

    async fn load_all(&self) -> Result<Vec<IdentityRecord>, DiskFull> {
      Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn insert(&self, record: &IdentityRecord) -> Result<(), DiskFull> {
      self.check()?;
      self.rows.lock().unwrap().insert(record.remote_id.clone(), record.clone());
      Ok(())
    }

    async fn rename(&self, remote_id: &RemoteId, new_local_username: &str) -> Result<(), DiskFull> {
      let pause = self.pause.lock().unwrap().take();
      if let Some(release) = pause {
        self.entered.notify_one();
        let _ = release.await;
      }
      self.check()?;
      if let Some(r) = self.rows.lock().unwrap().get_mut(remote_id) {
        r.local_username = new_local_username.to_owned();
      }
      Ok(())
    }

    async fn update_display_name(&self, remote_id: &RemoteId, display_name: &str) -> Result<(), DiskFull> {
      self.check()?;
      if let Some(r) = self.rows.lock().unwrap().get_mut(remote_id) {
        r.remote_display_name = display_name.to_owned();
      }
      Ok(())
    }

    async fn remove(&self, remote_id: &RemoteId) -> Result<(), DiskFull> {
      self.check()?;
      self.rows.lock().unwrap().remove(remote_id);
      Ok(())
    }
  }

  fn registrar() -> (Registrar<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    (Registrar::new(Arc::new(Directory::default()), store.clone()), store)
  }

  // ─── Validation ──────────────────────────────────────────────────────────

  #[test]
  fn validation_trims_and_accepts_game_names() {
    assert_eq!(validate_username("  Steve_2 ").unwrap(), "Steve_2");
  }

  #[test]
  fn validation_rejects_bad_names() {
    assert!(validate_username("ab").is_err());
    assert!(validate_username("a_name_that_is_too_long").is_err());
    assert!(validate_username("bad name").is_err());
    assert!(validate_username("émile").is_err());
  }

  // ─── Register ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn register_writes_directory_and_store() {
    let (reg, store) = registrar();
    let record = reg.register("D1".into(), "steve#0001", " Steve ").await.unwrap();

    assert_eq!(record.local_username, "Steve");
    assert_eq!(reg.directory().find_by_local_username("steve"), Some(record.clone()));
    assert_eq!(store.row("D1"), Some(record));
  }

  #[tokio::test]
  async fn second_registration_for_same_account_is_rejected() {
    let (reg, _) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();

    let err = reg.register("D1".into(), "steve", "Alex").await.unwrap_err();
    assert!(matches!(err, RegistrationError::AlreadyRegistered { ref existing } if existing == "Steve"));
    assert!(err.user_message().contains("Steve"));
    assert!(reg.directory().find_by_local_username("Alex").is_none());
  }

  #[tokio::test]
  async fn taken_username_is_rejected() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();

    let err = reg.register("D2".into(), "copycat", "STEVE").await.unwrap_err();
    assert!(matches!(err, RegistrationError::UsernameTaken(_)));
    assert!(store.row("D2").is_none());
  }

  #[tokio::test]
  async fn failed_persist_rolls_back_registration() {
    let (reg, store) = registrar();
    store.fail.store(true, Ordering::SeqCst);

    let err = reg.register("D1".into(), "steve", "Steve").await.unwrap_err();
    assert!(matches!(err, RegistrationError::Store(_)));
    assert!(reg.directory().is_empty());
  }

  // ─── Rename ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn rename_updates_directory_and_store() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();

    let record = reg.rename(&"D1".into(), "Alex").await.unwrap();
    assert_eq!(record.local_username, "Alex");
    assert!(reg.directory().find_by_local_username("Steve").is_none());
    assert_eq!(store.row("D1").unwrap().local_username, "Alex");
  }

  #[tokio::test]
  async fn rename_without_registration_is_rejected() {
    let (reg, _) = registrar();
    let err = reg.rename(&"D1".into(), "Alex").await.unwrap_err();
    assert!(matches!(err, RegistrationError::NotRegistered));
  }

  #[tokio::test]
  async fn rename_to_taken_name_keeps_original() {
    let (reg, _) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();
    reg.register("D2".into(), "alex", "Alex").await.unwrap();

    let err = reg.rename(&"D1".into(), "alex").await.unwrap_err();
    assert!(matches!(err, RegistrationError::UsernameTaken(_)));
    assert_eq!(
      reg.directory().find_by_local_username("Steve").map(|r| r.remote_id),
      Some(RemoteId::from("D1"))
    );
  }

  #[tokio::test]
  async fn failed_persist_rolls_back_rename() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();
    store.fail.store(true, Ordering::SeqCst);

    assert!(reg.rename(&"D1".into(), "Alex").await.is_err());
    assert!(reg.directory().find_by_local_username("Steve").is_some());
    assert!(reg.directory().find_by_local_username("Alex").is_none());
  }

  #[tokio::test]
  async fn registration_waits_while_a_rename_is_being_persisted() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();
    let (release, paused) = oneshot::channel();
    *store.pause.lock().unwrap() = Some(paused);
    store.fail.store(true, Ordering::SeqCst);

    let rename = tokio::spawn({
      let reg = reg.clone();
      async move { reg.rename(&"D1".into(), "Alex").await }
    });
    store.entered.notified().await;

    // "Steve" looks free in the directory while the rename is in flight.
    let competitor = tokio::spawn({
      let reg = reg.clone();
      async move { reg.register("D2".into(), "copycat", "Steve").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!competitor.is_finished());

    release.send(()).unwrap();
    assert!(matches!(rename.await.unwrap(), Err(RegistrationError::Store(_))));
    assert!(matches!(competitor.await.unwrap(), Err(RegistrationError::UsernameTaken(_))));

    assert_eq!(
      reg.directory().find_by_local_username("Steve").map(|r| r.remote_id),
      Some(RemoteId::from("D1"))
    );
    assert!(reg.directory().find_by_remote_id(&"D2".into()).is_none());
    assert_eq!(store.row("D1").unwrap().local_username, "Steve");
  }

  // ─── Unregister / display name ───────────────────────────────────────────

  #[tokio::test]
  async fn unregister_frees_the_name() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();

    reg.unregister(&"D1".into()).await.unwrap();
    assert!(store.row("D1").is_none());
    assert!(matches!(
      reg.unregister(&"D1".into()).await,
      Err(RegistrationError::NotRegistered)
    ));
    reg.register("D2".into(), "alex", "Steve").await.unwrap();
  }

  #[tokio::test]
  async fn failed_persist_rolls_back_unregister() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();
    store.fail.store(true, Ordering::SeqCst);

    assert!(reg.unregister(&"D1".into()).await.is_err());
    assert!(reg.directory().find_by_remote_id(&"D1".into()).is_some());
  }

  #[tokio::test]
  async fn refresh_display_name_updates_both_sides() {
    let (reg, store) = registrar();
    reg.register("D1".into(), "steve", "Steve").await.unwrap();

    reg.refresh_display_name(&"D1".into(), "Steve the Builder").await;
    assert_eq!(
      reg.directory().find_by_remote_id(&"D1".into()).unwrap().remote_display_name,
      "Steve the Builder"
    );
    assert_eq!(store.row("D1").unwrap().remote_display_name, "Steve the Builder");
  }
}
