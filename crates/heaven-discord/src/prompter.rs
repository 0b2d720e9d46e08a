//! [`DiscordPrompter`]: delivers confirmation prompts as direct messages.

use std::sync::Arc;

use heaven_core::{
  identity::RemoteId,
  prompt::{PromptContext, Prompter},
};
use serenity::{
  all::{CreateMessage, UserId},
  http::Http,
};
use tracing::debug;

use crate::{Error, Result, components::authorization_buttons};

/// Sends each prompt to the linked user's DMs with Allow / Deny buttons.
///
/// Only needs the REST client, so it works before (and independently of)
/// the gateway connection.
#[derive(Clone)]
pub struct DiscordPrompter {
  http: Arc<Http>,
}

impl DiscordPrompter {
  pub fn new(token: &str) -> Self { Self::from_http(Arc::new(Http::new(token))) }

  pub fn from_http(http: Arc<Http>) -> Self { Self { http } }
}

/// Discord snowflakes are non-zero `u64`s.
pub fn user_id(remote_id: &RemoteId) -> Result<UserId> {
  match remote_id.as_str().parse::<u64>() {
    Ok(id) if id != 0 => Ok(UserId::new(id)),
    _ => Err(Error::InvalidUserId(remote_id.clone())),
  }
}

impl Prompter for DiscordPrompter {
  type Error = Error;

  async fn send_confirmation_prompt(
    &self,
    remote_id: &RemoteId,
    context: &PromptContext,
  ) -> Result<()> {
    let user = user_id(remote_id)?;
    let message = CreateMessage::new()
      .content(context.summary())
      .components(authorization_buttons(context.request_id));

    let sent = user.direct_message(&self.http, message).await?;
    debug!(%remote_id, request_id = %context.request_id, message_id = %sent.id, "confirmation prompt delivered");
    Ok(())
  }
}
