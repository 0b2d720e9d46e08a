//! Gateway event handler: button clicks and modal submissions.

use std::sync::Arc;

use heaven_core::{
  gate::Gate,
  identity::RemoteId,
  registration::{Registrar, RegistrationError},
  store::DirectoryStore,
};
use serenity::{
  all::{
    ActionRowComponent, ChannelId, ComponentInteraction, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, GetMessages, Interaction, MessageId,
    ModalInteraction, User, UserId,
  },
  async_trait,
  model::gateway::Ready,
  prelude::*,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::components::{
  ButtonAction, ModalAction, USERNAME_INPUT_ID, parse_button, parse_modal, username_modal,
  whitelist_buttons,
};

pub const APPROVED_REPLY: &str = "Authorization allowed! ✅";
pub const DENIED_REPLY: &str = "Authorization denied! ❌";
pub const EXPIRED_REPLY: &str = "Authorization expired or already answered.";

const WHITELIST_MESSAGE: &str = "Link your Discord account to your nickname on the server. Every \
                                 login will then have to be approved here.";

pub struct Handler<S> {
  gate:              Arc<Gate>,
  registrar:         Registrar<S>,
  whitelist_channel: Option<ChannelId>,
}

impl<S: DirectoryStore + 'static> Handler<S> {
  pub fn new(gate: Arc<Gate>, registrar: Registrar<S>, whitelist_channel: Option<ChannelId>) -> Self {
    Self { gate, registrar, whitelist_channel }
  }

  async fn on_button(&self, ctx: &Context, component: &ComponentInteraction) {
    let Some(action) = parse_button(&component.data.custom_id) else {
      debug!(custom_id = %component.data.custom_id, "ignoring unknown component");
      return;
    };
    let remote_id = RemoteId::from(component.user.id.get());

    let response = match action {
      ButtonAction::Authorize { request_id, approved } => {
        let content =
          self.answer_authorization(remote_id, request_id, approved, display_name(&component.user));
        // Replaces the prompt so its buttons cannot be clicked again.
        CreateInteractionResponse::UpdateMessage(
          CreateInteractionResponseMessage::new().content(content).components(Vec::new()),
        )
      }
      ButtonAction::Register => match self.registrar.directory().find_by_remote_id(&remote_id) {
        Some(existing) => ephemeral(
          RegistrationError::AlreadyRegistered { existing: existing.local_username }.user_message(),
        ),
        None => CreateInteractionResponse::Modal(username_modal(ModalAction::Register)),
      },
      ButtonAction::ChangeNickname => {
        if self.registrar.directory().find_by_remote_id(&remote_id).is_some() {
          CreateInteractionResponse::Modal(username_modal(ModalAction::ChangeNickname))
        } else {
          ephemeral(RegistrationError::NotRegistered.user_message())
        }
      }
      ButtonAction::Unregister => ephemeral(match self.registrar.unregister(&remote_id).await {
        Ok(record) => format!("Unregistered {}.", record.local_username),
        Err(e) => e.user_message(),
      }),
    };

    if let Err(e) = component.create_response(&ctx.http, response).await {
      warn!(error = %e, ?action, "failed to answer component interaction");
    }
  }

  /// Settle the waiting request, then refresh the stored display name in
  /// the background. Returns the text that replaces the prompt.
  fn answer_authorization(
    &self,
    remote_id: RemoteId,
    request_id: Uuid,
    approved: bool,
    display_name: String,
  ) -> &'static str {
    let resolved = self.gate.resolve_request(&remote_id, request_id, approved);

    let registrar = self.registrar.clone();
    tokio::spawn(async move { registrar.refresh_display_name(&remote_id, &display_name).await });

    authorization_reply(approved, resolved)
  }

  /// Delete this bot's earlier posts in `channel`, then post a fresh
  /// whitelist message.
  async fn replace_whitelist_message(&self, ctx: &Context, channel: ChannelId, bot: UserId) {
    match channel.messages(&ctx.http, GetMessages::new().limit(100)).await {
      Ok(history) => {
        for id in own_messages(history.iter().map(|m| (m.author.id, m.id)), bot) {
          if let Err(e) = channel.delete_message(&ctx.http, id).await {
            warn!(%channel, message_id = %id, error = %e, "failed to delete old whitelist message");
          }
        }
      }
      Err(e) => warn!(%channel, error = %e, "failed to read whitelist channel history"),
    }

    let message = CreateMessage::new().content(WHITELIST_MESSAGE).components(whitelist_buttons());
    match channel.send_message(&ctx.http, message).await {
      Ok(_) => info!(%channel, "whitelist message posted"),
      Err(e) => warn!(%channel, error = %e, "failed to post whitelist message"),
    }
  }

  async fn on_modal(&self, ctx: &Context, modal: &ModalInteraction) {
    let Some(action) = parse_modal(&modal.data.custom_id) else {
      debug!(custom_id = %modal.data.custom_id, "ignoring unknown modal");
      return;
    };
    let remote_id = RemoteId::from(modal.user.id.get());
    let username = modal_value(modal, USERNAME_INPUT_ID).unwrap_or_default();

    let content = match action {
      ModalAction::Register => {
        match self.registrar.register(remote_id, &display_name(&modal.user), &username).await {
          Ok(record) => format!("Registered! You can now log in as {}.", record.local_username),
          Err(e) => e.user_message(),
        }
      }
      ModalAction::ChangeNickname => match self.registrar.rename(&remote_id, &username).await {
        Ok(record) => format!("Your nickname is now {}.", record.local_username),
        Err(e) => e.user_message(),
      },
    };

    if let Err(e) = modal.create_response(&ctx.http, ephemeral(content)).await {
      warn!(error = %e, ?action, "failed to answer modal submission");
    }
  }
}

#[async_trait]
impl<S> EventHandler for Handler<S>
where
  S: DirectoryStore + 'static,
{
  async fn ready(&self, ctx: Context, ready: Ready) {
    info!(user = %ready.user.name, user_id = %ready.user.id, "discord bot connected");

    let Some(channel) = self.whitelist_channel else { return };
    self.replace_whitelist_message(&ctx, channel, ready.user.id).await;
  }

  async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
    match interaction {
      Interaction::Component(component) => self.on_button(&ctx, &component).await,
      Interaction::Modal(modal) => self.on_modal(&ctx, &modal).await,
      _ => {}
    }
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Reply text for an Allow / Deny click; `resolved` is whether a request was
/// still waiting for it.
pub fn authorization_reply(approved: bool, resolved: bool) -> &'static str {
  match (resolved, approved) {
    (false, _) => EXPIRED_REPLY,
    (true, true) => APPROVED_REPLY,
    (true, false) => DENIED_REPLY,
  }
}

/// Ids of the messages in `history` that `bot` authored.
fn own_messages(
  history: impl IntoIterator<Item = (UserId, MessageId)>,
  bot: UserId,
) -> Vec<MessageId> {
  history
    .into_iter()
    .filter_map(|(author, id)| (author == bot).then_some(id))
    .collect()
}

fn display_name(user: &User) -> String { user.global_name.clone().unwrap_or_else(|| user.name.clone()) }

fn ephemeral(content: impl Into<String>) -> CreateInteractionResponse {
  CreateInteractionResponse::Message(
    CreateInteractionResponseMessage::new().content(content).ephemeral(true),
  )
}

/// The submitted value of the text input `custom_id`, if present.
fn modal_value(modal: &ModalInteraction, custom_id: &str) -> Option<String> {
  modal
    .data
    .components
    .iter()
    .flat_map(|row| row.components.iter())
    .find_map(|component| match component {
      ActionRowComponent::InputText(input) if input.custom_id == custom_id => input.value.clone(),
      _ => None,
    })
}

#[cfg(test)]
mod tests {
  use std::{convert::Infallible, time::Duration};

  use heaven_core::{
    directory::Directory,
    gate::Resolution,
    identity::IdentityRecord,
  };
  use tokio::sync::oneshot;

  use super::*;

  /// Accepts every write except display names, which never finish saving.
  struct StalledStore;

  impl DirectoryStore for StalledStore {
    type Error = Infallible;

    async fn load_all(&self) -> Result<Vec<IdentityRecord>, Infallible> { Ok(Vec::new()) }

    async fn insert(&self, _: &IdentityRecord) -> Result<(), Infallible> { Ok(()) }

    async fn rename(&self, _: &RemoteId, _: &str) -> Result<(), Infallible> { Ok(()) }

    async fn update_display_name(&self, _: &RemoteId, _: &str) -> Result<(), Infallible> {
      std::future::pending().await
    }

    async fn remove(&self, _: &RemoteId) -> Result<(), Infallible> { Ok(()) }
  }

  fn handler(gate: Arc<Gate>) -> Handler<StalledStore> {
    let directory = Arc::new(Directory::default());
    directory.insert(IdentityRecord::new("42", "old name", "Steve")).unwrap();
    Handler::new(gate, Registrar::new(directory, Arc::new(StalledStore)), None)
  }

  #[test]
  fn live_answers_echo_the_decision() {
    assert_eq!(authorization_reply(true, true), APPROVED_REPLY);
    assert_eq!(authorization_reply(false, true), DENIED_REPLY);
  }

  #[test]
  fn stale_answers_report_expiry() {
    assert_eq!(authorization_reply(true, false), EXPIRED_REPLY);
    assert_eq!(authorization_reply(false, false), EXPIRED_REPLY);
  }

  #[tokio::test]
  async fn click_without_pending_request_reports_expiry() {
    let handler = handler(Arc::new(Gate::new()));
    let reply = handler.answer_authorization(RemoteId::from(42_u64), Uuid::new_v4(), true, "new name".into());
    assert_eq!(reply, EXPIRED_REPLY);
  }

  #[tokio::test]
  async fn answer_reaches_the_waiter_before_the_display_name_is_saved() {
    let gate = Arc::new(Gate::new());
    let handler = handler(gate.clone());

    let (prompted, request) = oneshot::channel();
    let waiter = tokio::spawn({
      let gate = gate.clone();
      async move {
        gate
          .request(&RemoteId::from("42"), Duration::from_secs(10), move |request_id| async move {
            let _ = prompted.send(request_id);
            Ok::<_, Infallible>(())
          })
          .await
      }
    });
    let request_id = request.await.unwrap();

    let reply = handler.answer_authorization(RemoteId::from("42"), request_id, true, "new name".into());
    assert_eq!(reply, APPROVED_REPLY);
    let resolution = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert_eq!(resolution.unwrap().unwrap().unwrap(), Resolution::Approved);
  }

  #[test]
  fn only_the_bots_own_messages_are_cleaned_up() {
    let bot = UserId::new(1);
    let history = [
      (bot, MessageId::new(10)),
      (UserId::new(2), MessageId::new(11)),
      (bot, MessageId::new(12)),
    ];
    assert_eq!(own_messages(history, bot), vec![MessageId::new(10), MessageId::new(12)]);
    assert!(own_messages([(UserId::new(2), MessageId::new(13))], bot).is_empty());
  }
}
