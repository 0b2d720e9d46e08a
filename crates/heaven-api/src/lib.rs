//! JSON REST API for Heaven.
//!
//! Exposes an axum [`Router`] that a game server calls to look up linked
//! identities and to ask whether a login may proceed. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .merge(heaven_api::api_router(state))
//! ```

pub mod admission;
pub mod error;
pub mod identities;

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use heaven_core::{admission::AdmissionCoordinator, prompt::Prompter};

pub use error::ApiError;

/// Shared state threaded through all API handlers.
pub struct AppState<P> {
  pub coordinator:      AdmissionCoordinator<P>,
  /// How long an authorize call waits for the user's answer.
  pub approval_timeout: Duration,
}

impl<P> Clone for AppState<P> {
  fn clone(&self) -> Self {
    Self { coordinator: self.coordinator.clone(), approval_timeout: self.approval_timeout }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<P>(state: AppState<P>) -> Router<()>
where
  P: Prompter + 'static,
{
  Router::new()
    .route("/health", get(admission::health::<P>))
    .route("/identities", get(identities::list::<P>))
    .route("/identities/by-local-username/{name}", get(identities::by_local_username::<P>))
    .route("/identities/by-local-username/{name}/authorize", post(admission::authorize::<P>))
    .with_state(Arc::new(state))
}
