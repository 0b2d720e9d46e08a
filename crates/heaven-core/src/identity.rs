//! Identity records: the verified link between a Discord account and a
//! game-server username.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of an account on the messaging platform (a Discord user
/// snowflake, rendered as a string). Opaque to everything in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RemoteId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for RemoteId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for RemoteId {
  fn from(s: String) -> Self { Self(s) }
}

impl From<u64> for RemoteId {
  fn from(id: u64) -> Self { Self(id.to_string()) }
}

/// One linked identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
  pub remote_id:           RemoteId,
  /// Human-readable label on the messaging platform. Not unique.
  pub remote_display_name: String,
  /// Username on the game server, stored exactly as registered.
  pub local_username:      String,
}

impl IdentityRecord {
  pub fn new(
    remote_id: impl Into<RemoteId>,
    remote_display_name: impl Into<String>,
    local_username: impl Into<String>,
  ) -> Self {
    Self {
      remote_id:           remote_id.into(),
      remote_display_name: remote_display_name.into(),
      local_username:      local_username.into(),
    }
  }
}

/// How local usernames are compared for uniqueness and lookup.
///
/// Storage is always case-preserving; only the index key differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsernamePolicy {
  #[default]
  CaseInsensitive,
  CaseSensitive,
}

impl UsernamePolicy {
  /// The index key for `username` under this policy.
  pub fn key(self, username: &str) -> String {
    match self {
      Self::CaseInsensitive => username.to_lowercase(),
      Self::CaseSensitive => username.to_owned(),
    }
  }
}
