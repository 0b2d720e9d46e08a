//! Error types for `heaven-core`.

use thiserror::Error;

use crate::identity::RemoteId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("an identity is already registered for remote id {0}")]
  DuplicateRemoteId(RemoteId),

  #[error("local username {0:?} is already registered")]
  DuplicateLocalUsername(String),

  #[error("no identity registered for remote id {0}")]
  UnknownRemoteId(RemoteId),

  #[error("an authorization request is already pending for {0}")]
  AlreadyPending(RemoteId),

  #[error("confirmation prompt could not be delivered: {0}")]
  ServiceUnavailable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
