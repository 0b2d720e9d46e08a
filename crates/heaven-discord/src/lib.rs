//! Discord side of Heaven, built on serenity.
//!
//! - [`DiscordPrompter`] DMs confirmation prompts to linked users.
//! - [`handler::Handler`] reacts to the Allow / Deny buttons on those
//!   prompts and drives registration from the whitelist channel.
//! - [`DiscordBot`] wires both to one gateway connection.

pub mod components;
pub mod error;
pub mod handler;
pub mod prompter;

use std::sync::Arc;

use heaven_core::{gate::Gate, registration::Registrar, store::DirectoryStore};
use serenity::{
  all::{ChannelId, GatewayIntents, ShardManager},
  prelude::*,
};
use tracing::info;

pub use error::{Error, Result};
pub use handler::Handler;
pub use prompter::DiscordPrompter;

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DiscordConfig {
  pub bot_token:            String,
  /// Channel that receives the Register / Change nickname message on start.
  pub whitelist_channel_id: Option<u64>,
}

// ─── Bot ──────────────────────────────────────────────────────────────────────

/// A connected-but-not-yet-running serenity client.
pub struct DiscordBot {
  client: Client,
}

impl DiscordBot {
  /// Build the client and register the event handler. Does not open the
  /// gateway; call [`run`](Self::run) for that.
  pub async fn connect<S>(config: &DiscordConfig, gate: Arc<Gate>, registrar: Registrar<S>) -> Result<Self>
  where
    S: DirectoryStore + 'static,
  {
    let intents = GatewayIntents::GUILDS | GatewayIntents::DIRECT_MESSAGES;
    let channel = config.whitelist_channel_id.filter(|id| *id != 0).map(ChannelId::new);
    let handler = Handler::new(gate, registrar, channel);

    let client = Client::builder(&config.bot_token, intents).event_handler(handler).await?;
    Ok(Self { client })
  }

  /// A prompter sharing this client's REST connection.
  pub fn prompter(&self) -> DiscordPrompter { DiscordPrompter::from_http(self.client.http.clone()) }

  pub fn shard_manager(&self) -> Arc<ShardManager> { self.client.shard_manager.clone() }

  /// Run the gateway until it is shut down through the
  /// [`shard_manager`](Self::shard_manager) or fails.
  pub async fn run(mut self) -> Result<()> {
    info!("starting discord gateway");
    self.client.start().await?;
    info!("discord gateway stopped");
    Ok(())
  }
}
