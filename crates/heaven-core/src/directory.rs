//! [`Directory`]: the authoritative `remote_id ↔ record ↔ local_username`
//! mapping.
//!
//! Both indices live behind a single [`RwLock`], so every write is
//! all-or-nothing with respect to concurrent lookups: no reader can observe
//! one index updated and not the other.

use std::{
  collections::HashMap,
  sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tracing::warn;

use crate::{
  Error, Result,
  identity::{IdentityRecord, RemoteId, UsernamePolicy},
};

#[derive(Default)]
struct Indices {
  by_remote_id: HashMap<RemoteId, IdentityRecord>,
  /// Username key (per [`UsernamePolicy`]) → owning remote id.
  by_username:  HashMap<String, RemoteId>,
}

impl Indices {
  /// Validate both keys, then commit. Nothing is mutated on error.
  fn insert(&mut self, key: String, record: IdentityRecord) -> Result<()> {
    if self.by_remote_id.contains_key(&record.remote_id) {
      return Err(Error::DuplicateRemoteId(record.remote_id));
    }
    if self.by_username.contains_key(&key) {
      return Err(Error::DuplicateLocalUsername(record.local_username));
    }
    self.by_username.insert(key, record.remote_id.clone());
    self.by_remote_id.insert(record.remote_id.clone(), record);
    Ok(())
  }
}

/// In-memory identity registry shared by the admission and registration
/// paths.
pub struct Directory {
  policy:  UsernamePolicy,
  indices: RwLock<Indices>,
}

impl Default for Directory {
  fn default() -> Self { Self::new(UsernamePolicy::default()) }
}

impl Directory {
  pub fn new(policy: UsernamePolicy) -> Self {
    Self { policy, indices: RwLock::new(Indices::default()) }
  }

  // A panic while holding the lock cannot leave the indices half-written:
  // every mutation validates first and commits with infallible inserts.
  fn read(&self) -> RwLockReadGuard<'_, Indices> {
    self.indices.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Indices> {
    self.indices.write().unwrap_or_else(PoisonError::into_inner)
  }

  // ── Lookups ─────────────────────────────────────────────────────────────

  pub fn find_by_remote_id(&self, remote_id: &RemoteId) -> Option<IdentityRecord> {
    self.read().by_remote_id.get(remote_id).cloned()
  }

  pub fn find_by_local_username(&self, local_username: &str) -> Option<IdentityRecord> {
    let key = self.policy.key(local_username);
    let indices = self.read();
    indices
      .by_username
      .get(&key)
      .and_then(|id| indices.by_remote_id.get(id))
      .cloned()
  }

  /// Snapshot of every record, ordered by local username.
  pub fn records(&self) -> Vec<IdentityRecord> {
    let mut records: Vec<_> = self.read().by_remote_id.values().cloned().collect();
    records.sort_by(|a, b| a.local_username.cmp(&b.local_username));
    records
  }

  pub fn len(&self) -> usize { self.read().by_remote_id.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  // ── Writes ──────────────────────────────────────────────────────────────

  /// Add a new record.
  ///
  /// Fails with [`Error::DuplicateRemoteId`] or
  /// [`Error::DuplicateLocalUsername`]; in either case the directory is
  /// unchanged.
  pub fn insert(&self, record: IdentityRecord) -> Result<()> {
    let key = self.policy.key(&record.local_username);
    self.write().insert(key, record)
  }

  /// Remove the record for `remote_id` from both indices. Absent ids are a
  /// no-op and return `None`.
  pub fn remove_by_remote_id(&self, remote_id: &RemoteId) -> Option<IdentityRecord> {
    let mut indices = self.write();
    let record = indices.by_remote_id.remove(remote_id)?;
    indices.by_username.remove(&self.policy.key(&record.local_username));
    Some(record)
  }

  /// Change the local username of an existing record, returning the record
  /// as it was before the rename.
  ///
  /// Renaming to a name already owned by the same record (including a
  /// case-only change under [`UsernamePolicy::CaseInsensitive`]) succeeds.
  /// On any error the original mapping is left intact.
  pub fn rename(&self, remote_id: &RemoteId, new_local_username: &str) -> Result<IdentityRecord> {
    let new_key = self.policy.key(new_local_username);
    let mut indices = self.write();

    let previous = indices
      .by_remote_id
      .get(remote_id)
      .cloned()
      .ok_or_else(|| Error::UnknownRemoteId(remote_id.clone()))?;

    if let Some(owner) = indices.by_username.get(&new_key)
      && owner != remote_id
    {
      return Err(Error::DuplicateLocalUsername(new_local_username.to_owned()));
    }

    indices.by_username.remove(&self.policy.key(&previous.local_username));
    indices.by_username.insert(new_key, remote_id.clone());
    if let Some(record) = indices.by_remote_id.get_mut(remote_id) {
      record.local_username = new_local_username.to_owned();
    }

    Ok(previous)
  }

  /// Replace the display name of an existing record.
  pub fn update_display_name(&self, remote_id: &RemoteId, display_name: &str) -> Result<()> {
    let mut indices = self.write();
    let record = indices
      .by_remote_id
      .get_mut(remote_id)
      .ok_or_else(|| Error::UnknownRemoteId(remote_id.clone()))?;
    record.remote_display_name = display_name.to_owned();
    Ok(())
  }

  /// Bulk insert at start-up. Records that violate an invariant are logged
  /// and skipped; returns the number loaded.
  pub fn load(&self, records: impl IntoIterator<Item = IdentityRecord>) -> usize {
    let mut indices = self.write();
    let mut loaded = 0;
    for record in records {
      let key = self.policy.key(&record.local_username);
      match indices.insert(key, record) {
        Ok(()) => loaded += 1,
        Err(e) => warn!(error = %e, "skipping conflicting identity record"),
      }
    }
    loaded
  }
}
