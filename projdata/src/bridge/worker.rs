//! Installer worker task.
//!
//! The worker owns a [`BundleInstaller`] and runs install requests strictly
//! one at a time in arrival order. Every client sharing a worker therefore
//! gets the one-install-per-store guarantee without further locking.

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::protocol::{WorkerError, WorkerMessage, WorkerRequest};
use crate::installer::{ArchiveFetcher, BundleInstaller, ProgressCallback};

/// Default capacity of the request channel.
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Both ends of a running worker as seen by its client.
pub struct WorkerChannels {
    /// Submit requests. Dropping every sender stops the worker.
    pub requests: mpsc::Sender<WorkerRequest>,
    /// Progress and completion messages.
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
}

/// Spawn a worker on the current tokio runtime.
pub fn spawn_worker<F>(installer: BundleInstaller<F>) -> WorkerChannels
where
    F: ArchiveFetcher + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(DEFAULT_REQUEST_CAPACITY);
    let (message_tx, message_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_worker(installer, request_rx, message_tx));

    WorkerChannels {
        requests: request_tx,
        messages: message_rx,
    }
}

async fn run_worker<F>(
    installer: BundleInstaller<F>,
    mut requests: mpsc::Receiver<WorkerRequest>,
    messages: mpsc::UnboundedSender<WorkerMessage>,
) where
    F: ArchiveFetcher,
{
    info!("Installer worker started");

    while let Some(request) = requests.recv().await {
        let WorkerRequest::Install { id, request } = request;
        debug!(id, url = %request.url, version = %request.version, "Worker received install");

        let progress_tx = messages.clone();
        let on_progress: ProgressCallback = Box::new(move |report| {
            // Client gone; the final send below notices and stops the loop.
            let _ = progress_tx.send(WorkerMessage::Progress { id, report });
        });

        let message = match installer.install(&request, Some(on_progress)).await {
            Ok(outcome) => WorkerMessage::Ready { id, outcome },
            Err(e) => WorkerMessage::Error {
                id,
                error: WorkerError::from(&e),
            },
        };

        if messages.send(message).is_err() {
            debug!(id, "Client dropped before install finished");
            break;
        }
    }

    info!("Installer worker stopped");
}
