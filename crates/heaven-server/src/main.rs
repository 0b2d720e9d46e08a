//! heaven server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), loads linked
//! identities from SQLite, connects the Discord bot, and serves the admission
//! API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash` in config.toml:
//!
//! ```
//! cargo run -p heaven-server --bin heaven -- --hash-password
//! ```

use std::{
  future::IntoFuture as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use heaven_api::AppState;
use heaven_core::{
  admission::AdmissionCoordinator, directory::Directory, gate::Gate, registration::Registrar,
  store::DirectoryStore as _,
};
use heaven_discord::DiscordBot;
use heaven_server::{ServerConfig, auth::hash_password};
use heaven_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Discord-approved logins for a game server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = hash_password(&password).map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("HEAVEN"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Identities: SQLite is the durable copy, the directory answers lookups.
  let policy = server_cfg.username_policy();
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path, policy)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let records = store.load_all().await.context("failed to load identities")?;

  let directory = Arc::new(Directory::new(policy));
  let loaded = directory.load(records);
  info!(loaded, ?policy, "identity directory ready");

  let gate = Arc::new(Gate::new());
  let registrar = Registrar::new(directory.clone(), Arc::new(store));

  let bot = DiscordBot::connect(&server_cfg.discord(), gate.clone(), registrar)
    .await
    .context("failed to create discord client")?;
  let prompter = Arc::new(bot.prompter());
  let shards = bot.shard_manager();
  let mut bot_task = tokio::spawn(bot.run());

  let state = AppState {
    coordinator:      AdmissionCoordinator::new(
      directory,
      gate,
      prompter,
      server_cfg.service_name.clone(),
    ),
    approval_timeout: server_cfg.approval_timeout(),
  };
  let app = heaven_server::router(state, server_cfg.auth());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

  tokio::select! {
    result = server.into_future() => result.context("server error")?,
    result = &mut bot_task => {
      match result {
        Ok(Ok(())) => warn!("discord gateway exited; shutting down"),
        Ok(Err(e)) => error!(error = %e, "discord gateway failed; shutting down"),
        Err(e) => error!(error = %e, "discord task panicked; shutting down"),
      }
      return Ok(());
    }
  }

  shards.shutdown_all().await;
  if let Ok(Err(e)) = bot_task.await {
    warn!(error = %e, "discord gateway reported an error during shutdown");
  }
  info!("shut down cleanly");
  Ok(())
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("received Ctrl-C, shutting down"),
    Err(e) => {
      error!(error = %e, "failed to listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  }
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
