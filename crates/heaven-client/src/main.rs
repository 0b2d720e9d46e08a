//! heaven-login: run one admission check from the command line.
//!
//! Behaves like the game-server hook: prints the message a player would see
//! and exits non-zero unless the login is allowed.

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use heaven_client::{AdmissionClient, ClientConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Ask Heaven whether a player may log in")]
struct Cli {
  /// Game-server username to check.
  player: String,

  /// Network origin shown in the Discord prompt.
  #[arg(long)]
  from: Option<String>,

  #[arg(long, env = "HEAVEN_URL", default_value = "http://127.0.0.1:8080")]
  url: String,

  #[arg(long, env = "HEAVEN_USERNAME")]
  username: String,

  #[arg(long, env = "HEAVEN_PASSWORD", hide_env_values = true)]
  password: String,

  /// Seconds to wait for the answer; keep above the server's approval timeout.
  #[arg(long, default_value_t = 90)]
  timeout: u64,

  /// Print the linked Discord identity instead of asking for approval.
  #[arg(long)]
  whois: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let client = AdmissionClient::new(ClientConfig {
    base_url: cli.url,
    username: cli.username,
    password: cli.password,
    timeout:  Duration::from_secs(cli.timeout),
  })?;

  if cli.whois {
    return Ok(match client.fetch_identity(&cli.player).await? {
      Some(record) => {
        println!("{} is {} ({})", record.local_username, record.remote_display_name, record.remote_id);
        ExitCode::SUCCESS
      }
      None => {
        println!("{} is not registered", cli.player);
        ExitCode::FAILURE
      }
    });
  }

  let verdict = client.authorize(&cli.player, cli.from.as_deref()).await;
  println!("{}", verdict.message);
  Ok(if verdict.allowed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
