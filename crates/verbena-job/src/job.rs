//! Cancellable jobs with completion listeners.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use verbena_capability::{InputHandle, Outcome};

use crate::family::FamilyTag;

/// A completion listener. Fired exactly once with the terminal outcome.
pub type OnDone = Box<dyn FnOnce(&Outcome) + Send + 'static>;

/// Error raised when adding a family to a job that is already scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job families are sealed once the job is scheduled")]
pub struct FamiliesSealed;

/// Lifecycle states of a job. Transitions are monotonic; `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
  Created,
  Scheduled,
  Running,
  Done,
}

struct Inner {
  state: JobState,
  outcome: Option<Outcome>,
  listeners: Vec<OnDone>,
  families: HashSet<FamilyTag>,
}

/// One scheduled execution attempt of a capability against one input.
pub struct Job {
  id: String,
  capability_id: String,
  input: InputHandle,
  immediate: bool,
  cancel: CancellationToken,
  inner: Mutex<Inner>,
  done: watch::Sender<bool>,
}

impl Job {
  /// Create a job that will run a capability body when scheduled.
  pub fn new(
    capability_id: impl Into<String>,
    input: InputHandle,
    cancel: CancellationToken,
    families: HashSet<FamilyTag>,
  ) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      capability_id: capability_id.into(),
      input,
      immediate: false,
      cancel,
      inner: Mutex::new(Inner {
        state: JobState::Created,
        outcome: None,
        listeners: Vec::new(),
        families,
      }),
      done: watch::Sender::new(false),
    }
  }

  /// Create an immediate job: one constructed already holding its outcome,
  /// used for cache hits and substituted failures so callers observe a
  /// uniform job interface whether or not work actually ran. The engine
  /// completes it right after scheduling.
  pub fn immediate(capability_id: impl Into<String>, input: InputHandle) -> Self {
    let mut job = Self::new(
      capability_id,
      input,
      CancellationToken::new(),
      HashSet::new(),
    );
    job.immediate = true;
    job
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn capability_id(&self) -> &str {
    &self.capability_id
  }

  pub fn input(&self) -> &InputHandle {
    &self.input
  }

  /// Whether this job was short-circuited rather than actually run.
  pub fn is_immediate(&self) -> bool {
    self.immediate
  }

  pub fn state(&self) -> JobState {
    self.inner.lock().unwrap().state
  }

  /// Advance to `Scheduled` or `Running`. Regressions and transitions out
  /// of `Done` are ignored; `Done` is only reached through [`Job::complete`].
  pub fn advance(&self, to: JobState) -> bool {
    let mut inner = self.inner.lock().unwrap();
    if to == JobState::Done || to <= inner.state || inner.state == JobState::Done {
      return false;
    }
    inner.state = to;
    true
  }

  /// Complete the job with its terminal outcome, firing all attached
  /// listeners. Only the first completion takes effect.
  pub fn complete(&self, outcome: Outcome) -> bool {
    let listeners = {
      let mut inner = self.inner.lock().unwrap();
      if inner.state == JobState::Done {
        return false;
      }
      inner.state = JobState::Done;
      inner.outcome = Some(outcome.clone());
      std::mem::take(&mut inner.listeners)
    };
    for listener in listeners {
      listener(&outcome);
    }
    self.done.send_replace(true);
    debug!(job_id = %self.id, capability = %self.capability_id, "job completed");
    true
  }

  /// The terminal outcome, once the job is done.
  pub fn outcome(&self) -> Option<Outcome> {
    self.inner.lock().unwrap().outcome.clone()
  }

  /// Attach a completion listener. Listeners may be attached concurrently
  /// up to the point of completion; attaching to an already-done job
  /// replays the terminal outcome synchronously instead of dropping it.
  pub fn on_done<F>(&self, listener: F)
  where
    F: FnOnce(&Outcome) + Send + 'static,
  {
    let outcome = {
      let mut inner = self.inner.lock().unwrap();
      if let Some(outcome) = &inner.outcome {
        outcome.clone()
      } else {
        inner.listeners.push(Box::new(listener));
        return;
      }
    };
    listener(&outcome);
  }

  /// Await the terminal outcome.
  pub async fn wait(&self) -> Outcome {
    let mut rx = self.done.subscribe();
    loop {
      if let Some(outcome) = self.outcome() {
        return outcome;
      }
      // The sender lives inside self, so changed() cannot fail while we
      // hold a reference to the job.
      let _ = rx.changed().await;
    }
  }

  /// Request cooperative cancellation. Advisory: the running body decides
  /// when to observe the flag and terminate with a cancelled outcome.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn cancel_requested(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub fn cancel_token(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Add a family tag. Family membership is sealed once the job has been
  /// scheduled.
  pub fn add_family(&self, tag: FamilyTag) -> Result<(), FamiliesSealed> {
    let mut inner = self.inner.lock().unwrap();
    if inner.state > JobState::Created {
      return Err(FamiliesSealed);
    }
    inner.families.insert(tag);
    Ok(())
  }

  pub fn in_family(&self, tag: &FamilyTag) -> bool {
    self.inner.lock().unwrap().families.contains(tag)
  }

  pub fn families(&self) -> HashSet<FamilyTag> {
    self.inner.lock().unwrap().families.clone()
  }
}

impl std::fmt::Debug for Job {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Job")
      .field("id", &self.id)
      .field("capability_id", &self.capability_id)
      .field("input", &self.input.id())
      .field("immediate", &self.immediate)
      .field("state", &self.state())
      .finish_non_exhaustive()
  }
}
