//! [`AdmissionCoordinator`]: turns a connecting username into an
//! allow / deny decision.
//!
//! Denial is an ordinary outcome, not an error: only a failure to deliver the
//! confirmation prompt is reported as [`Decision::Error`].

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
  Error,
  directory::Directory,
  gate::{Gate, Resolution},
  identity::IdentityRecord,
  prompt::{PromptContext, Prompter},
};

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
  NotRegistered,
  Declined,
  TimedOut,
  AlreadyPending,
}

impl fmt::Display for DenyReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::NotRegistered => "not registered",
      Self::Declined => "declined",
      Self::TimedOut => "timed out",
      Self::AlreadyPending => "request already pending",
    })
  }
}

/// Infrastructure failure that prevented a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
  ServiceUnavailable,
}

impl fmt::Display for ErrorReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::ServiceUnavailable => f.write_str("service unavailable"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allow,
  Deny(DenyReason),
  Error(ErrorReason),
}

impl Decision {
  pub fn is_allow(self) -> bool { matches!(self, Self::Allow) }
}

/// Stateless glue between the [`Directory`], the [`Gate`] and a
/// [`Prompter`].
pub struct AdmissionCoordinator<P> {
  directory: Arc<Directory>,
  gate:      Arc<Gate>,
  prompter:  Arc<P>,
  /// Label shown to the user in the prompt.
  service:   String,
}

impl<P> Clone for AdmissionCoordinator<P> {
  fn clone(&self) -> Self {
    Self {
      directory: self.directory.clone(),
      gate:      self.gate.clone(),
      prompter:  self.prompter.clone(),
      service:   self.service.clone(),
    }
  }
}

impl<P: Prompter> AdmissionCoordinator<P> {
  pub fn new(
    directory: Arc<Directory>,
    gate: Arc<Gate>,
    prompter: Arc<P>,
    service: impl Into<String>,
  ) -> Self {
    Self { directory, gate, prompter, service: service.into() }
  }

  pub fn directory(&self) -> &Arc<Directory> { &self.directory }

  pub fn gate(&self) -> &Arc<Gate> { &self.gate }

  /// Record lookup for the post-admission hook (display label).
  pub fn lookup(&self, local_username: &str) -> Option<IdentityRecord> {
    self.directory.find_by_local_username(local_username)
  }

  /// Decide whether `local_username` may connect.
  ///
  /// Unregistered names are denied immediately without prompting anyone.
  /// Otherwise the linked user is prompted and the call waits at most
  /// `timeout` for the answer.
  pub async fn decide(
    &self,
    local_username: &str,
    origin: Option<&str>,
    timeout: Duration,
  ) -> Decision {
    let Some(record) = self.directory.find_by_local_username(local_username) else {
      info!(local_username, "denying unregistered username");
      return Decision::Deny(DenyReason::NotRegistered);
    };

    let origin = origin.map(str::to_owned);
    let remote_id = record.remote_id;
    let (prompter, target) = (&self.prompter, &remote_id);

    let outcome = self
      .gate
      .request(&remote_id, timeout, |request_id| {
        let context = PromptContext {
          request_id,
          local_username: record.local_username,
          service: self.service.clone(),
          origin,
        };
        async move { prompter.send_confirmation_prompt(target, &context).await }
      })
      .await;

    let decision = match outcome {
      Ok(Resolution::Approved) => Decision::Allow,
      Ok(Resolution::Denied) => Decision::Deny(DenyReason::Declined),
      Ok(Resolution::TimedOut) => Decision::Deny(DenyReason::TimedOut),
      Err(Error::AlreadyPending(_)) => Decision::Deny(DenyReason::AlreadyPending),
      Err(e) => {
        warn!(local_username, %remote_id, error = %e, "admission check failed");
        Decision::Error(ErrorReason::ServiceUnavailable)
      }
    };

    info!(local_username, %remote_id, ?decision, "admission decided");
    decision
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use tokio::sync::mpsc;

  use super::*;
  use crate::identity::{IdentityRecord, RemoteId};

  #[derive(Debug, thiserror::Error)]
  #[error("mock transport failure")]
  struct MockFailure;

  /// Forwards every prompt into a channel; can be switched to failing.
  struct MockPrompter {
    sent: mpsc::UnboundedSender<(RemoteId, PromptContext)>,
    fail: AtomicBool,
  }

  impl Prompter for MockPrompter {
    type Error = MockFailure;

    async fn send_confirmation_prompt(
      &self,
      remote_id: &RemoteId,
      context: &PromptContext,
    ) -> Result<(), MockFailure> {
      if self.fail.load(Ordering::SeqCst) {
        return Err(MockFailure);
      }
      let _ = self.sent.send((remote_id.clone(), context.clone()));
      Ok(())
    }
  }

  struct Fixture {
    coordinator: AdmissionCoordinator<MockPrompter>,
    prompts:     mpsc::UnboundedReceiver<(RemoteId, PromptContext)>,
  }

  fn fixture() -> Fixture {
    let directory = Arc::new(Directory::default());
    directory.insert(IdentityRecord::new("D1", "steve#0001", "Steve")).unwrap();
    let (sent, prompts) = mpsc::unbounded_channel();
    let prompter = Arc::new(MockPrompter { sent, fail: AtomicBool::new(false) });
    Fixture {
      coordinator: AdmissionCoordinator::new(directory, Arc::new(Gate::new()), prompter, "mc.example.com"),
      prompts,
    }
  }

  const WINDOW: Duration = Duration::from_secs(5);

  #[tokio::test]
  async fn approved_prompt_allows() {
    let Fixture { coordinator, mut prompts } = fixture();
    let gate = coordinator.gate().clone();

    let task = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.decide("Steve", Some("203.0.113.7"), WINDOW).await }
    });

    let (remote_id, context) = prompts.recv().await.unwrap();
    assert_eq!(remote_id, RemoteId::from("D1"));
    assert_eq!(context.local_username, "Steve");
    assert_eq!(context.origin.as_deref(), Some("203.0.113.7"));

    assert!(gate.resolve_request(&remote_id, context.request_id, true));
    assert_eq!(task.await.unwrap(), Decision::Allow);
  }

  #[tokio::test]
  async fn declined_prompt_denies() {
    let Fixture { coordinator, mut prompts } = fixture();
    let gate = coordinator.gate().clone();

    let task = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.decide("steve", None, WINDOW).await }
    });

    let (remote_id, _) = prompts.recv().await.unwrap();
    gate.resolve(&remote_id, false);
    assert_eq!(task.await.unwrap(), Decision::Deny(DenyReason::Declined));
  }

  #[tokio::test]
  async fn unknown_username_is_denied_without_prompt() {
    let Fixture { coordinator, mut prompts } = fixture();

    let decision = coordinator.decide("Unknown", None, WINDOW).await;
    assert_eq!(decision, Decision::Deny(DenyReason::NotRegistered));
    assert_eq!(DenyReason::NotRegistered.to_string(), "not registered");
    assert!(prompts.try_recv().is_err());
  }

  #[tokio::test]
  async fn unanswered_prompt_times_out() {
    let Fixture { coordinator, prompts: _prompts } = fixture();
    let decision = coordinator.decide("Steve", None, Duration::from_millis(50)).await;
    assert_eq!(decision, Decision::Deny(DenyReason::TimedOut));
    assert_eq!(coordinator.gate().pending_count(), 0);
  }

  #[tokio::test]
  async fn prompt_failure_is_service_unavailable_and_cleans_up() {
    let Fixture { coordinator, .. } = fixture();
    coordinator.prompter.fail.store(true, Ordering::SeqCst);

    let decision = coordinator.decide("Steve", None, WINDOW).await;
    assert_eq!(decision, Decision::Error(ErrorReason::ServiceUnavailable));
    assert!(!coordinator.gate().is_pending(&RemoteId::from("D1")));
  }

  #[tokio::test]
  async fn concurrent_attempt_for_same_identity_is_denied() {
    let Fixture { coordinator, mut prompts } = fixture();
    let gate = coordinator.gate().clone();

    let first = tokio::spawn({
      let coordinator = coordinator.clone();
      async move { coordinator.decide("Steve", None, WINDOW).await }
    });
    let (remote_id, _) = prompts.recv().await.unwrap();

    let second = coordinator.decide("Steve", None, WINDOW).await;
    assert_eq!(second, Decision::Deny(DenyReason::AlreadyPending));

    gate.resolve(&remote_id, true);
    assert_eq!(first.await.unwrap(), Decision::Allow);
  }
}
