//! Worker bridge for running installs off the caller's task.
//!
//! ```text
//! InstallerClient ── WorkerRequest ──► worker task ──► BundleInstaller
//!        ▲                                  │
//!        └──────────── WorkerMessage ───────┘
//!          (Progress*, then Ready or Error)
//! ```
//!
//! Requests carry a correlation id so responses can arrive for any number of
//! outstanding calls. The worker processes requests one at a time.

mod client;
mod protocol;
mod worker;

pub use client::InstallerClient;
pub use protocol::{RequestId, WorkerError, WorkerMessage, WorkerRequest};
pub use worker::{spawn_worker, WorkerChannels, DEFAULT_REQUEST_CAPACITY};
