// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./persistence_test.rs"]
mod persistence_test;

use cf_key_value::{Edit, Namespace, Store};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};

// Shared between the handles and the worker.
#[derive(Default)]
struct QueueState {
  running: AtomicBool,
  pending: AtomicUsize,
  warned_not_running: AtomicBool,
}

enum Request {
  Commit {
    namespace: Namespace,
    edits: Vec<Edit>,
  },
  Flush(oneshot::Sender<()>),
}

//
// PersistenceHandle
//

/// Queues store commits which are applied off the calling thread, one at a time and in the order
/// they were queued.
#[derive(Clone)]
pub struct PersistenceHandle {
  tx: mpsc::UnboundedSender<Request>,
  store: Store,
  queue: Arc<QueueState>,
}

impl PersistenceHandle {
  pub fn commit(&self, namespace: Namespace, edits: Vec<Edit>) {
    self.queue.pending.fetch_add(1, Ordering::SeqCst);
    if let Err(mpsc::error::SendError(request)) = self.tx.send(Request::Commit { namespace, edits })
    {
      self.queue.pending.fetch_sub(1, Ordering::SeqCst);
      // The worker is gone (e.g. during shutdown), write inline rather than lose the batch.
      log::debug!("persistence worker not running, committing inline");
      if let Request::Commit { namespace, edits } = request
        && let Err(e) = self.store.commit(namespace, edits)
      {
        log::warn!("failed to commit to {namespace:?}: {e:?}");
      }
      return;
    }

    if !self.queue.running.load(Ordering::SeqCst)
      && !self.queue.warned_not_running.swap(true, Ordering::SeqCst)
    {
      log::warn!(
        "queued a commit to {namespace:?} but the persistence worker has not been started; it \
         will be lost unless the worker runs"
      );
    }
  }

  #[must_use]
  pub fn is_worker_running(&self) -> bool {
    self.queue.running.load(Ordering::SeqCst)
  }

  /// Number of queued commits not yet applied.
  #[must_use]
  pub fn pending(&self) -> usize {
    self.queue.pending.load(Ordering::SeqCst)
  }

  /// Resolves once every commit queued before this call has been applied. Never resolves if the
  /// worker is alive but was never started.
  pub async fn flush(&self) {
    let (tx, rx) = oneshot::channel();
    if self.tx.send(Request::Flush(tx)).is_ok() {
      let _ignored = rx.await;
    }
  }
}

//
// PersistenceWorker
//

/// Applies commits queued through a [`PersistenceHandle`]. Must be driven with `run`; while it
/// exists without running, queued commits wait in memory and are lost at exit.
pub struct PersistenceWorker {
  rx: mpsc::UnboundedReceiver<Request>,
  store: Store,
  queue: Arc<QueueState>,
}

impl PersistenceWorker {
  #[must_use]
  pub fn new(store: Store) -> (PersistenceHandle, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = Arc::new(QueueState::default());
    (
      PersistenceHandle {
        tx,
        store: store.clone(),
        queue: queue.clone(),
      },
      Self { rx, store, queue },
    )
  }

  /// Applies queued commits until every handle has been dropped.
  pub async fn run(mut self) {
    self.queue.running.store(true, Ordering::SeqCst);
    while let Some(request) = self.rx.recv().await {
      match request {
        Request::Commit { namespace, edits } => {
          let store = self.store.clone();
          let result = tokio::task::spawn_blocking(move || store.commit(namespace, edits)).await;
          match result {
            Ok(Ok(())) => log::debug!("persisted queued batch to {namespace:?}"),
            Ok(Err(e)) => log::warn!("failed to commit to {namespace:?}: {e:?}"),
            Err(e) => log::warn!("commit task for {namespace:?} failed: {e}"),
          }
          self.queue.pending.fetch_sub(1, Ordering::SeqCst);
        },
        Request::Flush(tx) => {
          let _ignored = tx.send(());
        },
      }
    }

    self.queue.running.store(false, Ordering::SeqCst);
    log::debug!("persistence worker shutting down");
  }
}
