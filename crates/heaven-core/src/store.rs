//! The `DirectoryStore` trait: persistence behind the in-memory
//! [`Directory`](crate::directory::Directory).
//!
//! The directory stays authoritative for uniqueness; a store only mirrors
//! accepted writes so that registrations survive restarts. Implemented by
//! `heaven-store-sqlite`.

use std::future::Future;

use crate::identity::{IdentityRecord, RemoteId};

pub trait DirectoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every persisted record, for the bulk load at start-up.
  fn load_all(&self) -> impl Future<Output = Result<Vec<IdentityRecord>, Self::Error>> + Send + '_;

  /// Persist a newly registered record.
  fn insert<'a>(
    &'a self,
    record: &'a IdentityRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Change the local username of a persisted record.
  fn rename<'a>(
    &'a self,
    remote_id: &'a RemoteId,
    new_local_username: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Change the display name of a persisted record.
  fn update_display_name<'a>(
    &'a self,
    remote_id: &'a RemoteId,
    display_name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete a record. Absent ids are not an error.
  fn remove<'a>(
    &'a self,
    remote_id: &'a RemoteId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
