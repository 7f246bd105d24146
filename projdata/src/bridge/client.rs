//! Client side of the worker bridge.
//!
//! [`InstallerClient`] turns the message protocol back into an async call.
//! Each request gets a fresh correlation id and an entry in a pending table;
//! a dispatcher task reads worker messages and completes the matching entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::protocol::{RequestId, WorkerMessage, WorkerRequest};
use super::worker::spawn_worker;
use crate::installer::{
    ArchiveFetcher, BundleInstaller, InstallError, InstallOutcome, InstallRequest, InstallResult,
    ProgressCallback, ProgressReport,
};

/// Progress callback shared out of the pending table.
type SharedCallback = Arc<dyn Fn(ProgressReport) + Send + Sync>;

struct Pending {
    completion: oneshot::Sender<InstallResult<InstallOutcome>>,
    on_progress: Option<SharedCallback>,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<RequestId, Pending>,
    closed: bool,
}

fn worker_gone() -> InstallError {
    InstallError::Transport("installer worker channel closed".to_string())
}

/// Handle for submitting installs to a worker.
///
/// Cheap to share behind an `Arc`; concurrent calls are queued by the worker.
pub struct InstallerClient {
    requests: mpsc::Sender<WorkerRequest>,
    table: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
}

impl InstallerClient {
    /// Connect to a worker through its channels.
    ///
    /// Spawns the dispatcher on the current tokio runtime.
    pub fn new(
        requests: mpsc::Sender<WorkerRequest>,
        messages: mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> Self {
        let table = Arc::new(Mutex::new(PendingTable::default()));
        tokio::spawn(dispatch(Arc::clone(&table), messages));

        Self {
            requests,
            table,
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawn a dedicated worker for `installer` and connect to it.
    pub fn spawn<F>(installer: BundleInstaller<F>) -> Self
    where
        F: ArchiveFetcher + 'static,
    {
        let channels = spawn_worker(installer);
        Self::new(channels.requests, channels.messages)
    }

    /// Submit an install and wait for its outcome.
    ///
    /// `on_progress` runs on the dispatcher task for every progress message.
    /// Errors raised by the worker arrive as [`InstallError::Worker`] with
    /// their original kind. A broken channel fails with
    /// [`InstallError::Transport`].
    pub async fn install(
        &self,
        request: InstallRequest,
        on_progress: Option<ProgressCallback>,
    ) -> InstallResult<InstallOutcome> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (completion, result) = oneshot::channel();

        {
            let mut table = self.table.lock();
            if table.closed {
                return Err(worker_gone());
            }
            table.entries.insert(
                id,
                Pending {
                    completion,
                    on_progress: on_progress.map(SharedCallback::from),
                },
            );
        }

        if self
            .requests
            .send(WorkerRequest::Install { id, request })
            .await
            .is_err()
        {
            self.table.lock().entries.remove(&id);
            return Err(worker_gone());
        }

        result.await.unwrap_or_else(|_| Err(worker_gone()))
    }

    /// Requests submitted and not yet completed.
    pub fn pending(&self) -> usize {
        self.table.lock().entries.len()
    }
}

async fn dispatch(
    table: Arc<Mutex<PendingTable>>,
    mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    while let Some(message) = messages.recv().await {
        match message {
            WorkerMessage::Progress { id, report } => {
                // The callback runs after the lock is released.
                let callback = table.lock().entries.get(&id).map(|p| p.on_progress.clone());
                match callback {
                    Some(Some(cb)) => cb(report),
                    Some(None) => {}
                    None => debug!(id, "Progress for unknown request"),
                }
            }
            WorkerMessage::Ready { id, outcome } => complete(&table, id, Ok(outcome)),
            WorkerMessage::Error { id, error } => complete(&table, id, Err(error.into())),
        }
    }

    let orphaned: Vec<Pending> = {
        let mut table = table.lock();
        table.closed = true;
        table.entries.drain().map(|(_, pending)| pending).collect()
    };
    if !orphaned.is_empty() {
        warn!(pending = orphaned.len(), "Installer worker closed with requests in flight");
    }
    for pending in orphaned {
        let _ = pending.completion.send(Err(worker_gone()));
    }
}

fn complete(
    table: &Mutex<PendingTable>,
    id: RequestId,
    result: InstallResult<InstallOutcome>,
) {
    let pending = table.lock().entries.remove(&id);
    match pending {
        Some(pending) => {
            // The caller may have stopped waiting.
            let _ = pending.completion.send(result);
        }
        None => debug!(id, "Completion for unknown request"),
    }
}
