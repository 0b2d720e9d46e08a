use heaven_core::identity::RemoteId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("discord error: {0}")]
  Discord(#[from] serenity::Error),

  #[error("{0} is not a discord user id")]
  InvalidUserId(RemoteId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
