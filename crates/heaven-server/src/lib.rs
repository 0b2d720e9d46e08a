//! HTTP server assembly for Heaven.
//!
//! Wraps the [`heaven_api`] router with Basic auth and request tracing, and
//! holds the runtime configuration read by the `heaven` binary.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware};
use heaven_api::AppState;
use heaven_core::{identity::UsernamePolicy, prompt::Prompter};
use heaven_discord::DiscordConfig;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `HEAVEN_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                     String,
  pub port:                     u16,
  pub store_path:               PathBuf,
  pub auth_username:            String,
  pub auth_password_hash:       String,
  #[serde(default = "default_approval_timeout_secs")]
  pub approval_timeout_secs:    u64,
  #[serde(default)]
  pub case_sensitive_usernames: bool,
  /// Shown to users in confirmation prompts, e.g. `mc.example.com`.
  pub service_name:             String,
  pub discord_token:            String,
  #[serde(default)]
  pub whitelist_channel_id:     Option<u64>,
}

fn default_approval_timeout_secs() -> u64 { 60 }

impl ServerConfig {
  pub fn approval_timeout(&self) -> Duration { Duration::from_secs(self.approval_timeout_secs) }

  pub fn username_policy(&self) -> UsernamePolicy {
    if self.case_sensitive_usernames {
      UsernamePolicy::CaseSensitive
    } else {
      UsernamePolicy::CaseInsensitive
    }
  }

  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }

  pub fn discord(&self) -> DiscordConfig {
    DiscordConfig {
      bot_token:            self.discord_token.clone(),
      whitelist_channel_id: self.whitelist_channel_id,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router with every route behind Basic auth.
pub fn router<P>(state: AppState<P>, auth: AuthConfig) -> Router
where
  P: Prompter + 'static,
{
  heaven_api::api_router(state)
    .layer(middleware::from_fn_with_state(Arc::new(auth), require_auth))
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use heaven_core::{
    admission::AdmissionCoordinator,
    directory::Directory,
    gate::Gate,
    identity::{IdentityRecord, RemoteId},
    prompt::PromptContext,
  };
  use tower::ServiceExt as _;

  use super::*;

  /// Approves every prompt on delivery.
  struct AutoApprove(Arc<Gate>);

  impl Prompter for AutoApprove {
    type Error = Infallible;

    async fn send_confirmation_prompt(
      &self,
      remote_id: &RemoteId,
      context: &PromptContext,
    ) -> Result<(), Infallible> {
      self.0.resolve_request(remote_id, context.request_id, true);
      Ok(())
    }
  }

  fn app() -> Router {
    let directory = Arc::new(Directory::default());
    directory.insert(IdentityRecord::new("1001", "steve", "Steve")).unwrap();
    let gate = Arc::new(Gate::new());
    let prompter = Arc::new(AutoApprove(gate.clone()));
    let state = AppState {
      coordinator:      AdmissionCoordinator::new(directory, gate, prompter, "test"),
      approval_timeout: Duration::from_secs(1),
    };
    let auth = AuthConfig {
      username:      "minecraft".to_string(),
      password_hash: auth::hash_password("secret").unwrap(),
    };
    router(state, auth)
  }

  fn request(uri: &str, credentials: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some((user, pass)) = credentials {
      builder = builder.header(header::AUTHORIZATION, format!("Basic {}", B64.encode(format!("{user}:{pass}"))));
    }
    builder.body(Body::empty()).unwrap()
  }

  #[tokio::test]
  async fn api_requires_credentials() {
    let resp = app()
      .oneshot(request("/identities/by-local-username/Steve/authorize", None))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn wrong_password_is_rejected_before_prompting() {
    let resp = app()
      .oneshot(request("/identities/by-local-username/Steve/authorize", Some(("minecraft", "nope"))))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn authenticated_request_reaches_the_api() {
    let resp = app()
      .oneshot(request("/identities/by-local-username/Steve/authorize", Some(("minecraft", "secret"))))
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[test]
  fn config_defaults_apply() {
    let cfg: ServerConfig = config::Config::builder()
      .set_override("host", "127.0.0.1").unwrap()
      .set_override("port", 8080).unwrap()
      .set_override("store_path", "heaven.db").unwrap()
      .set_override("auth_username", "minecraft").unwrap()
      .set_override("auth_password_hash", "$argon2id$…").unwrap()
      .set_override("service_name", "mc.example.com").unwrap()
      .set_override("discord_token", "token").unwrap()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.approval_timeout(), Duration::from_secs(60));
    assert_eq!(cfg.username_policy(), UsernamePolicy::CaseInsensitive);
    assert_eq!(cfg.discord().whitelist_channel_id, None);
  }
}
