//! Handlers for `/identities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/identities` | Every linked identity, by username |
//! | `GET`  | `/identities/by-local-username/{name}` | 404 if no record |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use heaven_core::{identity::IdentityRecord, prompt::Prompter};

use crate::{AppState, error::ApiError};

/// `GET /identities`
pub async fn list<P>(State(state): State<Arc<AppState<P>>>) -> Json<Vec<IdentityRecord>>
where
  P: Prompter,
{
  Json(state.coordinator.directory().records())
}

/// `GET /identities/by-local-username/{name}`
///
/// Used by the game server after admission to label the player.
pub async fn by_local_username<P>(
  State(state): State<Arc<AppState<P>>>,
  Path(name): Path<String>,
) -> Result<Json<IdentityRecord>, ApiError>
where
  P: Prompter,
{
  state
    .coordinator
    .lookup(&name)
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("no identity registered for {name}")))
}
