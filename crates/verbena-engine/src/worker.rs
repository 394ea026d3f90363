//! Channel-based change worker.
//!
//! The `ChangeWorker` owns an mpsc channel for receiving resource-change
//! batches and feeds them into the engine's invalidation path. The host's
//! change notifier gets a sender handle and the worker loop runs until its
//! cancellation token trips.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::ExecutionEngine;
use crate::invalidation::ChangeBatch;

/// Error raised when notifying a worker whose loop has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("change worker channel closed")]
pub struct ChannelClosed;

/// Drains resource-change batches into [`ExecutionEngine::invalidate`].
pub struct ChangeWorker {
  sender: mpsc::Sender<ChangeBatch>,
  receiver: mpsc::Receiver<ChangeBatch>,
  engine: ExecutionEngine,
}

impl ChangeWorker {
  pub fn new(engine: ExecutionEngine) -> Self {
    Self::with_buffer_size(engine, 100)
  }

  pub fn with_buffer_size(engine: ExecutionEngine, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
    }
  }

  /// A sender handle for the host's change notifier.
  pub fn sender(&self) -> mpsc::Sender<ChangeBatch> {
    self.sender.clone()
  }

  /// Queue one batch of changes. Convenience over [`ChangeWorker::sender`].
  pub async fn notify(&self, batch: ChangeBatch) -> Result<(), ChannelClosed> {
    self.sender.send(batch).await.map_err(|_| ChannelClosed)
  }

  /// Run the invalidation loop until the token is cancelled or every
  /// sender handle is dropped.
  pub async fn start(mut self, cancel: CancellationToken) {
    info!("change worker started");
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("change worker cancelled");
          break;
        }
        batch = self.receiver.recv() => {
          match batch {
            Some(batch) => {
              debug!(events = batch.len(), "processing change batch");
              self.engine.invalidate(&batch);
            }
            None => {
              info!("change worker channel closed");
              break;
            }
          }
        }
      }
    }
  }
}
