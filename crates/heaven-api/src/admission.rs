//! Handlers for the admission check and service health.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/identities/by-local-username/{name}/authorize` | Optional `?from=<addr>`; blocks until answered |
//! | `GET`  | `/health` | Directory and gate sizes |
//!
//! The authorize status code carries the decision:
//!
//! | Status | Decision |
//! |--------|----------|
//! | 200 | allowed |
//! | 401 | declined or timed out |
//! | 404 | username not registered |
//! | 409 | another request for the same account is pending |
//! | 503 | confirmation prompt could not be delivered |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use heaven_core::{
  admission::{Decision, DenyReason},
  prompt::Prompter,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AppState, error::ApiError};

// ─── Authorize ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
  /// Network origin of the connecting client, shown in the prompt.
  pub from: Option<String>,
}

/// JSON body returned by [`authorize`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionBody {
  /// `"allow"`, `"deny"` or `"error"`.
  pub decision: String,
  pub reason:   Option<String>,
}

impl From<Decision> for DecisionBody {
  fn from(decision: Decision) -> Self {
    let (decision, reason) = match decision {
      Decision::Allow => ("allow", None),
      Decision::Deny(reason) => ("deny", Some(reason.to_string())),
      Decision::Error(reason) => ("error", Some(reason.to_string())),
    };
    Self { decision: decision.to_owned(), reason }
  }
}

fn status_for(decision: Decision) -> StatusCode {
  match decision {
    Decision::Allow => StatusCode::OK,
    Decision::Deny(DenyReason::NotRegistered) => StatusCode::NOT_FOUND,
    Decision::Deny(DenyReason::AlreadyPending) => StatusCode::CONFLICT,
    Decision::Deny(DenyReason::Declined | DenyReason::TimedOut) => StatusCode::UNAUTHORIZED,
    Decision::Error(_) => StatusCode::SERVICE_UNAVAILABLE,
  }
}

/// `POST /identities/by-local-username/{name}/authorize[?from=<addr>]`
pub async fn authorize<P>(
  State(state): State<Arc<AppState<P>>>,
  Path(name): Path<String>,
  Query(params): Query<AuthorizeParams>,
) -> Result<Response, ApiError>
where
  P: Prompter,
{
  let name = name.trim();
  if name.is_empty() {
    return Err(ApiError::BadRequest("username must not be empty".to_owned()));
  }

  let origin = params.from.as_deref().filter(|o| !o.is_empty());
  let decision = state.coordinator.decide(name, origin, state.approval_timeout).await;
  debug!(username = name, ?decision, "answering authorize request");

  Ok((status_for(decision), Json(DecisionBody::from(decision))).into_response())
}

// ─── Health ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthBody {
  pub status:     String,
  pub identities: usize,
  pub pending:    usize,
}

/// `GET /health`
pub async fn health<P>(State(state): State<Arc<AppState<P>>>) -> Json<HealthBody>
where
  P: Prompter,
{
  Json(HealthBody {
    status:     "ok".to_owned(),
    identities: state.coordinator.directory().len(),
    pending:    state.coordinator.gate().pending_count(),
  })
}
