//! Pulling notifications from GitHub into the durable job queue.

mod enqueue;
mod ingest;
mod service;

pub use enqueue::{JobTableEnqueuer, NotificationEnqueuer};
pub use ingest::{GithubIngestor, NotificationIngestor};
pub use service::{
    SyncContext, SyncOlderArgs, SyncOlderReport, SyncOutcome, SyncResult, SyncService,
};
