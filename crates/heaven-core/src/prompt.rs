//! The [`Prompter`] trait: delivery of the interactive confirmation message.
//!
//! Implemented by the Discord adapter (`heaven-discord`). The answer does not
//! come back through this trait: it arrives later on the platform's event
//! path, which calls [`Gate::resolve_request`](crate::gate::Gate::resolve_request).

use std::future::Future;

use serde::Serialize;
use uuid::Uuid;

use crate::identity::RemoteId;

/// What the user is being asked to approve.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
  /// Id of the pending request; answers should echo it back to
  /// [`Gate::resolve_request`](crate::gate::Gate::resolve_request).
  pub request_id:     Uuid,
  /// Game-server username the connection claims.
  pub local_username: String,
  /// Label of the guarded service (e.g. the server address).
  pub service:        String,
  /// Where the connection comes from, if the caller knows.
  pub origin:         Option<String>,
}

impl PromptContext {
  /// One-line, human readable description of the login attempt.
  pub fn summary(&self) -> String {
    match &self.origin {
      Some(origin) => format!(
        "New login request for {} on {} from {}.",
        self.local_username, self.service, origin
      ),
      None => format!("New login request for {} on {}.", self.local_username, self.service),
    }
  }
}

/// Sends a confirmation prompt to a user on the messaging platform.
///
/// Fire-and-forget: `Ok` means the prompt was handed to the platform, not
/// that the user answered.
pub trait Prompter: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn send_confirmation_prompt<'a>(
    &'a self,
    remote_id: &'a RemoteId,
    context: &'a PromptContext,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
