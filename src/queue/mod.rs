// Queue module - persistent job queue and the worker that drains it

pub mod manager;
pub mod worker;

pub use manager::{QueueItem, QueueManager, QueueStatus};
pub use worker::{enqueue_playlist, enqueue_url, JobOptions, QueueWorker, RunSummary, WorkerControl};
