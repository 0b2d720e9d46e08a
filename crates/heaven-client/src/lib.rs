//! Async HTTP client for the game-server side of Heaven.
//!
//! A login hook calls [`AdmissionClient::authorize`] when a player connects
//! and kicks them unless the returned [`Verdict`] allows it.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use heaven_core::identity::IdentityRecord;
use reqwest::{Client, StatusCode, Url, header::WWW_AUTHENTICATE};
use tracing::{debug, warn};

pub const ACCEPTED: &str = "Login accepted from Discord";
pub const DENIED: &str = "Login denied from Discord";
pub const NOT_REGISTERED: &str =
  "Not registered on Discord. Check if you're logging from a correct nickname.";
pub const ALREADY_PENDING: &str = "Another login for this account is awaiting approval.";
pub const UNAVAILABLE: &str = "Authorization service was not available";

/// Connection settings for the Heaven API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
  /// Must exceed the server's approval timeout, since `authorize` blocks
  /// until the user answers.
  pub timeout:  Duration,
}

/// The outcome of a login check, ready to show to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
  pub allowed: bool,
  pub message: &'static str,
}

impl Verdict {
  fn from_status(status: StatusCode) -> Self {
    let (allowed, message) = match status {
      StatusCode::OK => (true, ACCEPTED),
      StatusCode::UNAUTHORIZED => (false, DENIED),
      StatusCode::NOT_FOUND => (false, NOT_REGISTERED),
      StatusCode::CONFLICT => (false, ALREADY_PENDING),
      _ => (false, UNAVAILABLE),
    };
    Self { allowed, message }
  }

  fn unavailable() -> Self { Self { allowed: false, message: UNAVAILABLE } }
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct AdmissionClient {
  client: Client,
  base:   Url,
  config: ClientConfig,
}

impl AdmissionClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let base = Url::parse(&config.base_url)
      .with_context(|| format!("invalid base URL {:?}", config.base_url))?;
    if base.cannot_be_a_base() {
      bail!("base URL {:?} cannot carry a path", config.base_url);
    }
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, base, config })
  }

  /// `{base}/identities/by-local-username/{username}[/{action}]`, with the
  /// username escaped as a single path segment.
  fn identity_url(&self, username: &str, action: Option<&str>) -> Url {
    let mut url = self.base.clone();
    // `new` rejected bases without a path.
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().extend(["identities", "by-local-username", username]);
      segments.extend(action);
    }
    url
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.basic_auth(&self.config.username, Some(&self.config.password))
  }

  /// `POST /identities/by-local-username/{name}/authorize[?from=<origin>]`
  ///
  /// Never fails: transport problems, rejected API credentials and
  /// unexpected statuses fold into a denying [`Verdict`].
  pub async fn authorize(&self, username: &str, origin: Option<&str>) -> Verdict {
    let mut req = self.auth(self.client.post(self.identity_url(username, Some("authorize"))));
    if let Some(origin) = origin {
      req = req.query(&[("from", origin)]);
    }

    match req.send().await {
      Ok(resp) if resp.headers().contains_key(WWW_AUTHENTICATE) => {
        warn!(username, "authorization service rejected our credentials");
        Verdict::unavailable()
      }
      Ok(resp) => {
        let verdict = Verdict::from_status(resp.status());
        debug!(username, status = %resp.status(), allowed = verdict.allowed, "login checked");
        verdict
      }
      Err(e) => {
        warn!(username, error = %e, "authorization service unreachable");
        Verdict::unavailable()
      }
    }
  }

  /// `GET /identities/by-local-username/{name}`
  pub async fn fetch_identity(&self, username: &str) -> Result<Option<IdentityRecord>> {
    let resp = self
      .auth(self.client.get(self.identity_url(username, None)))
      .send()
      .await
      .with_context(|| format!("GET identity {username} failed"))?;

    match resp.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        resp.json().await.map(Some).context("deserialising identity")
      }
      status => Err(anyhow!("GET identity {username} → {status}")),
    }
  }
}
