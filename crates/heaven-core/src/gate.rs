//! [`Gate`]: suspends an admission attempt until the linked Discord user
//! answers the confirmation prompt.
//!
//! Every pending request owns a private one-shot channel. [`Gate::resolve`]
//! removes the entry for one remote id and signals only that channel, so an
//! answer can never wake a waiter belonging to a different identity.
//! [`Gate::resolve_request`] additionally checks the per-request id, so an
//! answer to an expired prompt cannot settle a newer request for the same id.
//!
//! The entry is registered *before* the prompt is sent. A resolution that
//! lands between "prompt sent" and "wait begins" is buffered in the channel
//! and observed as soon as the waiter polls it.

use std::{fmt::Display, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Error, Result, identity::RemoteId};

/// Terminal state of a pending request, as observed by the waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  Approved,
  Denied,
  TimedOut,
}

impl Resolution {
  pub fn is_approved(self) -> bool { matches!(self, Self::Approved) }
}

struct PendingRequest {
  /// Identifies the call that created this entry; cleanup only removes the
  /// entry carrying its own ticket.
  ticket:     Uuid,
  created_at: DateTime<Utc>,
  reply:      oneshot::Sender<bool>,
}

/// Correlation table of in-flight authorization requests, keyed by remote id.
#[derive(Default)]
pub struct Gate {
  pending: DashMap<RemoteId, PendingRequest>,
}

/// Removes the pending entry when the request call finishes for any reason,
/// including the request future being dropped mid-wait.
struct PendingGuard<'a> {
  gate:      &'a Gate,
  remote_id: &'a RemoteId,
  ticket:    Uuid,
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) {
    self
      .gate
      .pending
      .remove_if(self.remote_id, |_, p| p.ticket == self.ticket);
  }
}

impl Gate {
  pub fn new() -> Self { Self::default() }

  /// Register a pending request for `remote_id`, deliver the confirmation
  /// prompt via `send_prompt`, then wait for [`resolve`](Self::resolve).
  ///
  /// `send_prompt` receives the request id that a targeted answer must carry
  /// (see [`resolve_request`](Self::resolve_request)). `timeout` bounds the
  /// whole call, prompt delivery included.
  ///
  /// Fails immediately with [`Error::AlreadyPending`] if another request for
  /// the same id is in flight, and with [`Error::ServiceUnavailable`] if the
  /// prompt cannot be delivered. The pending entry never outlives this call.
  pub async fn request<F, Fut, E>(
    &self,
    remote_id: &RemoteId,
    timeout: Duration,
    send_prompt: F,
  ) -> Result<Resolution>
  where
    F: FnOnce(Uuid) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
  {
    let started = Instant::now();
    let deadline = started + timeout;
    let (reply, mut receiver) = oneshot::channel();
    let ticket = Uuid::new_v4();

    match self.pending.entry(remote_id.clone()) {
      Entry::Occupied(_) => {
        debug!(%remote_id, "rejecting concurrent authorization request");
        return Err(Error::AlreadyPending(remote_id.clone()));
      }
      Entry::Vacant(slot) => {
        slot.insert(PendingRequest { ticket, created_at: Utc::now(), reply });
      }
    }
    let guard = PendingGuard { gate: self, remote_id, ticket };

    let resolution = match tokio::time::timeout_at(deadline, send_prompt(ticket)).await {
      Ok(Err(e)) => {
        warn!(%remote_id, error = %e, "failed to deliver confirmation prompt");
        return Err(Error::ServiceUnavailable(e.to_string()));
      }
      Ok(Ok(())) => match tokio::time::timeout_at(deadline, &mut receiver).await {
        Ok(Ok(approved)) => outcome(approved),
        // The sender only disappears without a value if the gate itself is
        // torn down under us.
        Ok(Err(_)) => Resolution::Denied,
        Err(_) => expire(guard, &mut receiver),
      },
      Err(_) => {
        warn!(%remote_id, ?timeout, "confirmation prompt still undelivered at deadline");
        expire(guard, &mut receiver)
      }
    };

    debug!(
      %remote_id,
      %ticket,
      waited = ?started.elapsed(),
      ?resolution,
      "authorization request finished"
    );
    Ok(resolution)
  }

  /// Deliver the user's answer for whichever request is pending for
  /// `remote_id`.
  ///
  /// Wakes exactly the one waiter registered for that id and returns `true`.
  /// A late, duplicate or spurious answer finds no entry and returns `false`.
  pub fn resolve(&self, remote_id: &RemoteId, approved: bool) -> bool {
    let Some((_, pending)) = self.pending.remove(remote_id) else {
      debug!(%remote_id, approved, "no pending authorization request; ignoring");
      return false;
    };
    deliver(remote_id, pending, approved)
  }

  /// Like [`resolve`](Self::resolve), but only answers the request whose id
  /// was handed to `send_prompt`. An answer to an earlier, expired prompt
  /// for the same user is ignored.
  pub fn resolve_request(&self, remote_id: &RemoteId, request_id: Uuid, approved: bool) -> bool {
    let Some((_, pending)) = self.pending.remove_if(remote_id, |_, p| p.ticket == request_id)
    else {
      debug!(%remote_id, %request_id, approved, "no matching authorization request; ignoring");
      return false;
    };
    deliver(remote_id, pending, approved)
  }

  pub fn is_pending(&self, remote_id: &RemoteId) -> bool { self.pending.contains_key(remote_id) }

  pub fn pending_count(&self) -> usize { self.pending.len() }
}

fn deliver(remote_id: &RemoteId, pending: PendingRequest, approved: bool) -> bool {
  let age_ms = (Utc::now() - pending.created_at).num_milliseconds();
  if pending.reply.send(approved).is_err() {
    debug!(%remote_id, "authorization waiter already gone");
    return false;
  }
  info!(%remote_id, approved, age_ms, "authorization request resolved");
  true
}

/// Give up on a request whose deadline passed. `resolve` may have taken the
/// entry just before the guard did, so a buffered answer still wins.
fn expire(guard: PendingGuard<'_>, receiver: &mut oneshot::Receiver<bool>) -> Resolution {
  drop(guard);
  match receiver.try_recv() {
    Ok(approved) => outcome(approved),
    Err(_) => Resolution::TimedOut,
  }
}

fn outcome(approved: bool) -> Resolution {
  if approved { Resolution::Approved } else { Resolution::Denied }
}
